pub use generated_abi::{
    ABI_SIGNATURES,
    GAME_CONTRACT_ADDRESS,
    GameCall,
    stardrop_types,
};

pub mod amount;
pub mod board;
pub mod chain;
pub mod config;
pub mod cues;
pub mod delegation;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod session;
pub mod wallets;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

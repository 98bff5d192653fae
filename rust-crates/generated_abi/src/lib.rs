//! Bindings for the StarDrop game contract.
//!
//! Everything in here is a pure translation layer: calls are encoded to
//! calldata, return data and receipt logs are decoded back into typed values.
//! Nothing talks to the network.

use alloy::{
    primitives::{
        Address,
        B256,
        Bytes,
        U256,
        address,
    },
    sol_types::{
        SolCall,
        SolEvent,
        SolValue,
    },
};
use thiserror::Error;

pub mod stardrop_types {
    alloy::sol! {
        #[sol(all_derives)]
        interface IStarDrop {
            event BallDropped(address player, uint256 wager, uint256 multiplier, uint256 payout);

            function dropBall(uint256 wager) external payable returns (uint256 multiplier, uint256 payout);
            function settleTickets(uint256 amount) external;
            function mintNFT(uint256 toyId) external;
            function balanceOf(address account) external view returns (uint256);
            function ticketBalanceOf(address account) external view returns (uint256);
        }
    }
}

use stardrop_types::IStarDrop;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;

/// Game contract on Abstract testnet.
pub const GAME_CONTRACT_ADDRESS: Address =
    address!("72b5946D36cfB812DA21376F782D88AB3F03F107");

/// Canonical signatures of every item of the contract surface this client
/// depends on. Deployment records are fingerprinted against this list.
pub const ABI_SIGNATURES: [&str; 6] = [
    IStarDrop::dropBallCall::SIGNATURE,
    IStarDrop::settleTicketsCall::SIGNATURE,
    IStarDrop::mintNFTCall::SIGNATURE,
    IStarDrop::balanceOfCall::SIGNATURE,
    IStarDrop::ticketBalanceOfCall::SIGNATURE,
    IStarDrop::BallDropped::SIGNATURE,
];

#[derive(Debug, Error)]
pub enum AbiError {
    #[error("failed to decode contract data: {0}")]
    Decode(#[from] alloy::sol_types::Error),
}

/// State-mutating calls a player can make against the game contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameCall {
    DropBall { wager: U256 },
    SettleTickets { amount: U256 },
    MintNft { toy_id: U256 },
}

impl GameCall {
    pub fn function_name(&self) -> &'static str {
        match self {
            GameCall::DropBall { .. } => "dropBall",
            GameCall::SettleTickets { .. } => "settleTickets",
            GameCall::MintNft { .. } => "mintNFT",
        }
    }

    pub fn calldata(&self) -> Bytes {
        match self {
            GameCall::DropBall { wager } => {
                IStarDrop::dropBallCall { wager: *wager }.abi_encode().into()
            }
            GameCall::SettleTickets { amount } => {
                IStarDrop::settleTicketsCall { amount: *amount }
                    .abi_encode()
                    .into()
            }
            GameCall::MintNft { toy_id } => {
                IStarDrop::mintNFTCall { toyId: *toy_id }.abi_encode().into()
            }
        }
    }

    /// Native value attached to the transaction. Only drops carry the wager.
    pub fn value(&self) -> U256 {
        match self {
            GameCall::DropBall { wager } => *wager,
            _ => U256::ZERO,
        }
    }
}

pub fn ticket_balance_of(account: Address) -> Bytes {
    IStarDrop::ticketBalanceOfCall { account }.abi_encode().into()
}

/// Decodes the return data of the single-`uint256` view functions.
pub fn decode_uint_return(data: &[u8]) -> Result<U256, AbiError> {
    Ok(U256::abi_decode(data)?)
}

/// A log as it appears in a transaction receipt, independent of which
/// client produced the receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BallDropOutcome {
    pub player: Address,
    pub wager: U256,
    pub multiplier: U256,
    pub payout: U256,
}

/// Finds the first `BallDropped` emitted by `contract` among `logs`.
///
/// Logs from other addresses or with other topics are skipped. A matching
/// topic with undecodable data is an error rather than a miss.
pub fn find_ball_dropped(
    logs: &[RawLog],
    contract: Address,
) -> Result<Option<BallDropOutcome>, AbiError> {
    let matching = logs.iter().find(|log| {
        log.address == contract
            && log.topics.first() == Some(&IStarDrop::BallDropped::SIGNATURE_HASH)
    });
    let Some(log) = matching else {
        return Ok(None);
    };
    let event =
        IStarDrop::BallDropped::decode_raw_log(log.topics.iter().copied(), &log.data)?;
    Ok(Some(BallDropOutcome {
        player: event.player,
        wager: event.wager,
        multiplier: event.multiplier,
        payout: event.payout,
    }))
}

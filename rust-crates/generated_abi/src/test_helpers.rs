use alloy::{
    primitives::{
        Address,
        B256,
        Bytes,
        U256,
        address,
        utils::parse_ether,
    },
    sol_types::SolEvent,
};

use crate::{
    GAME_CONTRACT_ADDRESS,
    RawLog,
    stardrop_types::IStarDrop,
};

pub const TEST_CONTRACT: Address = GAME_CONTRACT_ADDRESS;
pub const TEST_PLAYER: Address = address!("1111111111111111111111111111111111111111");
pub const TEST_SMART_ACCOUNT: Address =
    address!("2222222222222222222222222222222222222222");

pub fn ether(amount: &str) -> U256 {
    parse_ether(amount).expect("valid ether literal")
}

pub fn ball_dropped_log(
    contract: Address,
    player: Address,
    wager: U256,
    multiplier: U256,
    payout: U256,
) -> RawLog {
    let event = IStarDrop::BallDropped {
        player,
        wager,
        multiplier,
        payout,
    };
    RawLog {
        address: contract,
        topics: vec![IStarDrop::BallDropped::SIGNATURE_HASH],
        data: event.encode_data().into(),
    }
}

/// A log the game client must not mistake for a drop result.
pub fn transfer_log(contract: Address) -> RawLog {
    RawLog {
        address: contract,
        topics: vec![B256::repeat_byte(0xdd), B256::ZERO, B256::ZERO],
        data: Bytes::from(U256::from(1u64).to_be_bytes::<32>().to_vec()),
    }
}

use alloy::primitives::{
    B256,
    U256,
};
use thiserror::Error;

use crate::amount::format_native;

/// The wallet provider could not be reached or the user declined.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionFailure {
    #[error("wallet provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("connection rejected: {0}")]
    Rejected(String),
    #[error("connected to chain {actual}, expected chain {expected}")]
    WrongChain { expected: u64, actual: u64 },
    #[error("session request failed: {0}")]
    Session(String),
    #[error("initial balance read failed: {0}")]
    InitialRead(#[from] ReadFailure),
}

impl ConnectionFailure {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ProviderUnavailable(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

/// A state-mutating call did not produce a usable, successful receipt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionFailure {
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("transaction reverted{}: {reason}", describe_hash(.tx_hash))]
    Reverted {
        tx_hash: Option<B256>,
        reason: String,
    },
    #[error("network error: {0}")]
    Network(String),
    #[error("transaction {tx_hash} emitted no BallDropped event")]
    MissingEvent { tx_hash: B256 },
    #[error("malformed receipt: {0}")]
    Malformed(String),
}

impl TransactionFailure {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn reverted(tx_hash: Option<B256>, reason: impl Into<String>) -> Self {
        Self::Reverted {
            tx_hash,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadFailure {
    #[error("balance query failed: {0}")]
    Balance(String),
    #[error("ticket query failed: {0}")]
    Tickets(String),
}

/// Local checks that reject a request before anything is sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Precondition {
    #[error("no wallet connected")]
    NotConnected,
    #[error("a connection attempt is already in progress")]
    AlreadyConnecting,
    #[error("a wallet is already connected; disconnect first")]
    AlreadyConnected,
    #[error("a drop is already in flight")]
    DropInFlight,
    #[error("wager {} is below the minimum of {}", amount(.wager), amount(.minimum))]
    WagerBelowMinimum { wager: U256, minimum: U256 },
    #[error("wager {} exceeds the balance of {}", amount(.wager), amount(.balance))]
    WagerAboveBalance { wager: U256, balance: U256 },
    #[error("need {need} tickets, have {have}")]
    InsufficientTickets { need: u64, have: u64 },
    #[error("ticket amount must be positive")]
    ZeroTickets,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error(transparent)]
    Connection(#[from] ConnectionFailure),
    #[error(transparent)]
    Transaction(#[from] TransactionFailure),
    #[error(transparent)]
    Read(#[from] ReadFailure),
    #[error(transparent)]
    Precondition(#[from] Precondition),
}

impl WalletError {
    /// True when the request was refused locally and nothing hit the network.
    pub fn is_local(&self) -> bool {
        matches!(self, WalletError::Precondition(_))
    }
}

fn describe_hash(tx_hash: &Option<B256>) -> String {
    tx_hash.map(|hash| format!(" ({hash})")).unwrap_or_default()
}

fn amount(value: &U256) -> String {
    format_native(*value)
}

pub type Result<T, E = WalletError> = std::result::Result<T, E>;

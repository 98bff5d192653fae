use alloy::primitives::{
    Address,
    B256,
    U256,
};
use generated_abi::{
    GameCall,
    RawLog,
};

use crate::{
    error::{
        ConnectionFailure,
        ReadFailure,
        TransactionFailure,
    },
    session::{
        Credential,
        WalletKind,
    },
};

/// Remote side of a connected wallet: submits game calls and reads the
/// ledger for one account.
pub trait GameLedger {
    /// Account whose balances are read and on whose behalf calls are sent.
    fn account(&self) -> Address;

    fn contract(&self) -> Address;

    /// Sends `call` and waits for it to be final.
    fn submit(
        &self,
        call: GameCall,
    ) -> impl Future<Output = Result<TxReceipt, TransactionFailure>>;

    fn native_balance(&self) -> impl Future<Output = Result<U256, ReadFailure>>;

    fn ticket_balance(&self) -> impl Future<Output = Result<U256, ReadFailure>>;
}

/// Produces a ledger and signing credential for a wallet kind.
pub trait Connector {
    type Ledger: GameLedger + Clone;

    fn connect(
        &self,
        kind: WalletKind,
        password: String,
    ) -> impl Future<Output = Result<Connection<Self::Ledger>, ConnectionFailure>>;
}

pub struct Connection<L> {
    pub ledger: L,
    pub credential: Credential,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub succeeded: bool,
    pub logs: Vec<RawLog>,
}

impl TxReceipt {
    pub fn success(tx_hash: B256, logs: Vec<RawLog>) -> Self {
        Self {
            tx_hash,
            succeeded: true,
            logs,
        }
    }

    pub fn reverted(tx_hash: B256) -> Self {
        Self {
            tx_hash,
            succeeded: false,
            logs: Vec::new(),
        }
    }

    pub fn ensure_succeeded(&self) -> Result<(), TransactionFailure> {
        if self.succeeded {
            Ok(())
        } else {
            Err(TransactionFailure::reverted(
                Some(self.tx_hash),
                "execution reverted",
            ))
        }
    }
}

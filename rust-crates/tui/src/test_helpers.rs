//! In-memory doubles for the ledger and connector seams.

use alloy::primitives::{
    Address,
    B256,
    U256,
};
use chrono::{
    DateTime,
    Utc,
};
use generated_abi::{
    GameCall,
    test_helpers::{
        TEST_CONTRACT,
        TEST_PLAYER,
        TEST_SMART_ACCOUNT,
        ball_dropped_log,
    },
};
use std::{
    cell::{
        Cell,
        RefCell,
    },
    collections::VecDeque,
    rc::Rc,
};
use tokio::sync::{
    Semaphore,
    oneshot,
};

use crate::{
    delegation::{
        Permission,
        SessionCredential,
    },
    error::{
        ConnectionFailure,
        ReadFailure,
        TransactionFailure,
    },
    ledger::{
        Connection,
        Connector,
        GameLedger,
        TxReceipt,
    },
    orchestrator::{
        GameEvent,
        GameObserver,
    },
    session::{
        Credential,
        WalletKind,
    },
};

pub const PASSWORD: &str = "hunter2";

/// Receipt for a successful drop carrying a `BallDropped` event from the
/// test contract.
pub fn drop_receipt(wager: U256, multiplier: U256, payout: U256) -> TxReceipt {
    TxReceipt::success(
        B256::repeat_byte(0x42),
        vec![ball_dropped_log(
            TEST_CONTRACT,
            TEST_PLAYER,
            wager,
            multiplier,
            payout,
        )],
    )
}

#[derive(Default)]
struct LedgerState {
    balance: U256,
    tickets: U256,
    submitted: Vec<GameCall>,
    receipts: VecDeque<Result<TxReceipt, TransactionFailure>>,
    read_failure: Option<ReadFailure>,
    reads: usize,
    /// Balances the chain reports once the next submission succeeds.
    after_submit: Option<(U256, U256)>,
    hold_reads: bool,
    held_reads: Vec<Option<oneshot::Sender<()>>>,
}

/// Scriptable ledger. Clones share state so a test can keep a handle after
/// giving one to the session.
#[derive(Clone)]
pub struct FakeLedger {
    account: Address,
    state: Rc<RefCell<LedgerState>>,
    gate: Option<Rc<Semaphore>>,
}

impl FakeLedger {
    pub fn new(account: Address, balance: U256, tickets: u64) -> Self {
        Self {
            account,
            state: Rc::new(RefCell::new(LedgerState {
                balance,
                tickets: U256::from(tickets),
                ..LedgerState::default()
            })),
            gate: None,
        }
    }

    /// Submissions block until [`FakeLedger::release`] is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Rc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn push_receipt(&self, receipt: Result<TxReceipt, TransactionFailure>) {
        self.state.borrow_mut().receipts.push_back(receipt);
    }

    pub fn set_after_submit(&self, balance: U256, tickets: u64) {
        self.state.borrow_mut().after_submit = Some((balance, U256::from(tickets)));
    }

    pub fn set_balances(&self, balance: U256, tickets: u64) {
        let mut state = self.state.borrow_mut();
        state.balance = balance;
        state.tickets = U256::from(tickets);
    }

    pub fn fail_reads(&self, failure: ReadFailure) {
        self.state.borrow_mut().read_failure = Some(failure);
    }

    /// While set, each balance read takes its values immediately but does
    /// not complete until released with [`FakeLedger::release_read`].
    pub fn hold_reads(&self, hold: bool) {
        self.state.borrow_mut().hold_reads = hold;
    }

    /// Completes the `index`-th held read, counted in issue order.
    pub fn release_read(&self, index: usize) {
        let sender = self
            .state
            .borrow_mut()
            .held_reads
            .get_mut(index)
            .and_then(Option::take);
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    pub fn submitted(&self) -> Vec<GameCall> {
        self.state.borrow().submitted.clone()
    }

    pub fn submit_count(&self) -> usize {
        self.state.borrow().submitted.len()
    }

    pub fn read_count(&self) -> usize {
        self.state.borrow().reads
    }

    fn hold_read(&self) -> Option<oneshot::Receiver<()>> {
        let mut state = self.state.borrow_mut();
        if !state.hold_reads {
            return None;
        }
        let (sender, receiver) = oneshot::channel();
        state.held_reads.push(Some(sender));
        Some(receiver)
    }

    fn read(&self) -> Result<(U256, U256), ReadFailure> {
        let mut state = self.state.borrow_mut();
        state.reads += 1;
        match &state.read_failure {
            Some(failure) => Err(failure.clone()),
            None => Ok((state.balance, state.tickets)),
        }
    }
}

impl GameLedger for FakeLedger {
    fn account(&self) -> Address {
        self.account
    }

    fn contract(&self) -> Address {
        TEST_CONTRACT
    }

    async fn submit(&self, call: GameCall) -> Result<TxReceipt, TransactionFailure> {
        self.state.borrow_mut().submitted.push(call);
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| TransactionFailure::network(e.to_string()))?;
            permit.forget();
        }
        let mut state = self.state.borrow_mut();
        let receipt = state
            .receipts
            .pop_front()
            .unwrap_or_else(|| Ok(TxReceipt::success(B256::repeat_byte(0x01), Vec::new())));
        if receipt.as_ref().is_ok_and(|r| r.succeeded)
            && let Some((balance, tickets)) = state.after_submit.take()
        {
            state.balance = balance;
            state.tickets = tickets;
        }
        receipt
    }

    async fn native_balance(&self) -> Result<U256, ReadFailure> {
        let balance = self.read().map(|(balance, _)| balance);
        if let Some(held) = self.hold_read() {
            let _ = held.await;
        }
        balance
    }

    async fn ticket_balance(&self) -> Result<U256, ReadFailure> {
        self.read().map(|(_, tickets)| tickets)
    }
}

/// Hands out one shared [`FakeLedger`]. Fails when `failure` is set or the
/// password does not match [`PASSWORD`].
#[derive(Clone)]
pub struct FakeConnector {
    ledger: FakeLedger,
    failure: Rc<RefCell<Option<ConnectionFailure>>>,
    connects: Rc<Cell<usize>>,
}

impl FakeConnector {
    pub fn new(balance: U256, tickets: u64) -> Self {
        Self::with_ledger(FakeLedger::new(TEST_PLAYER, balance, tickets))
    }

    pub fn with_ledger(ledger: FakeLedger) -> Self {
        Self {
            ledger,
            failure: Rc::new(RefCell::new(None)),
            connects: Rc::new(Cell::new(0)),
        }
    }

    /// Behaves like a machine with no usable wallet.
    pub fn unavailable() -> Self {
        let connector = Self::new(U256::ZERO, 0);
        connector.fail_with(ConnectionFailure::unavailable("no keystore found"));
        connector
    }

    pub fn fail_with(&self, failure: ConnectionFailure) {
        *self.failure.borrow_mut() = Some(failure);
    }

    pub fn ledger(&self) -> FakeLedger {
        self.ledger.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.get()
    }
}

impl Connector for FakeConnector {
    type Ledger = FakeLedger;

    async fn connect(
        &self,
        kind: WalletKind,
        password: String,
    ) -> Result<Connection<FakeLedger>, ConnectionFailure> {
        self.connects.set(self.connects.get() + 1);
        if let Some(failure) = self.failure.borrow().clone() {
            return Err(failure);
        }
        if password != PASSWORD {
            return Err(ConnectionFailure::rejected("invalid password"));
        }
        let credential = match kind {
            WalletKind::DirectSigner => Credential::Direct {
                signer: self.ledger.account(),
            },
            WalletKind::SessionDelegated => Credential::Delegated(test_session()),
        };
        Ok(Connection {
            ledger: self.ledger.clone(),
            credential,
        })
    }
}

pub fn test_session() -> SessionCredential {
    SessionCredential {
        session_id: "session-1".to_string(),
        account: TEST_SMART_ACCOUNT,
        scope: Permission::ALL.into_iter().collect(),
        expires_at: DateTime::<Utc>::from_timestamp(1_700_003_600, 0).unwrap_or_default(),
    }
}

/// Observer that keeps every event for later assertions.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    events: Rc<RefCell<Vec<GameEvent>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<GameEvent> {
        self.events.borrow().clone()
    }
}

impl GameObserver for RecordingObserver {
    fn observe(&self, event: GameEvent) {
        self.events.borrow_mut().push(event);
    }
}

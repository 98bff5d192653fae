//! Connected-wallet state: address, credential, cached balances, and the
//! single-drop-in-flight guard.
//!
//! All methods take `&self`; state lives in `Cell`/`RefCell` and is never
//! borrowed across an await, so a session can be shared (`Rc`) between the
//! UI loop and the local tasks it spawns.

use alloy::primitives::{
    Address,
    B256,
    U256,
};
use generated_abi::{
    GameCall,
    find_ball_dropped,
};
use std::cell::{
    Cell,
    RefCell,
};
use tracing::{
    debug,
    info,
    warn,
};

use crate::{
    amount::{
        MIN_WAGER,
        format_native,
        whole_units_floor,
    },
    delegation::SessionCredential,
    error::{
        ConnectionFailure,
        Precondition,
        ReadFailure,
        Result,
        TransactionFailure,
    },
    ledger::{
        Connection,
        Connector,
        GameLedger,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletKind {
    SessionDelegated,
    DirectSigner,
}

impl WalletKind {
    pub fn label(self) -> &'static str {
        match self {
            WalletKind::SessionDelegated => "session",
            WalletKind::DirectSigner => "direct",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    Delegated(SessionCredential),
    Direct { signer: Address },
}

impl Credential {
    pub fn kind(&self) -> WalletKind {
        match self {
            Credential::Delegated(_) => WalletKind::SessionDelegated,
            Credential::Direct { .. } => WalletKind::DirectSigner,
        }
    }
}

/// Answer to the connection prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Approval {
    Granted { password: String },
    Declined,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    DropInFlight,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub address: Address,
    pub balance: U256,
    pub tickets: u64,
    pub credential: Credential,
}

impl Account {
    pub fn kind(&self) -> WalletKind {
        self.credential.kind()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Balances {
    pub balance: U256,
    pub tickets: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DropResult {
    pub wager: U256,
    /// Raw contract value.
    pub multiplier: U256,
    pub payout: U256,
    pub tickets_awarded: u64,
    pub tx_hash: B256,
}

/// Local adjustment applied ahead of the authoritative refresh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BalanceDelta {
    pub debit: U256,
    pub credit: U256,
    pub tickets_gained: u64,
    pub tickets_spent: u64,
}

impl BalanceDelta {
    pub fn for_drop(result: &DropResult) -> Self {
        Self {
            debit: result.wager,
            credit: result.payout,
            tickets_gained: result.tickets_awarded,
            tickets_spent: 0,
        }
    }

    pub fn for_mint(ticket_cost: u64) -> Self {
        Self {
            tickets_spent: ticket_cost,
            ..Self::default()
        }
    }
}

/// Identifies one connection; results tagged with an older epoch are dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Epoch(u64);

struct Link<L> {
    ledger: L,
    account: Account,
    epoch: Epoch,
}

enum Phase<L> {
    Disconnected,
    Connecting(Epoch),
    Connected(Link<L>),
}

pub struct WalletSession<C: Connector> {
    connector: C,
    phase: RefCell<Phase<C::Ledger>>,
    next_epoch: Cell<u64>,
    drop_in_flight: Cell<bool>,
    refresh_issued: Cell<u64>,
    refresh_applied: Cell<u64>,
}

struct BusyGuard<'a>(&'a Cell<bool>);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<C: Connector> WalletSession<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            phase: RefCell::new(Phase::Disconnected),
            next_epoch: Cell::new(0),
            drop_in_flight: Cell::new(false),
            refresh_issued: Cell::new(0),
            refresh_applied: Cell::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        match &*self.phase.borrow() {
            Phase::Disconnected => SessionState::Disconnected,
            Phase::Connecting(_) => SessionState::Connecting,
            Phase::Connected(_) if self.drop_in_flight.get() => SessionState::DropInFlight,
            Phase::Connected(_) => SessionState::Connected,
        }
    }

    pub fn account(&self) -> Option<Account> {
        match &*self.phase.borrow() {
            Phase::Connected(link) => Some(link.account.clone()),
            _ => None,
        }
    }

    pub fn epoch(&self) -> Option<Epoch> {
        match &*self.phase.borrow() {
            Phase::Connected(link) => Some(link.epoch),
            _ => None,
        }
    }

    pub fn has_credential(&self) -> bool {
        matches!(&*self.phase.borrow(), Phase::Connected(_))
    }

    pub fn is_drop_in_flight(&self) -> bool {
        self.drop_in_flight.get()
    }

    /// Reports failure without retrying; on any failure the session is back
    /// to `Disconnected`. A live connection must be dropped with
    /// [`WalletSession::disconnect`] first.
    pub async fn connect(&self, kind: WalletKind, approval: Approval) -> Result<Account> {
        let epoch = {
            let mut phase = self.phase.borrow_mut();
            match *phase {
                Phase::Connecting(_) => return Err(Precondition::AlreadyConnecting.into()),
                Phase::Connected(_) => return Err(Precondition::AlreadyConnected.into()),
                Phase::Disconnected => {}
            }
            let epoch = self.bump_epoch();
            *phase = Phase::Connecting(epoch);
            epoch
        };
        info!(kind = kind.label(), "connecting wallet");

        let outcome = self.establish(kind, approval).await;

        let mut phase = self.phase.borrow_mut();
        if !matches!(*phase, Phase::Connecting(current) if current == epoch) {
            debug!("connection attempt superseded");
            return Err(ConnectionFailure::rejected("connection cancelled").into());
        }
        match outcome {
            Ok((ledger, account)) => {
                info!(
                    address = %account.address,
                    balance = %format_native(account.balance),
                    tickets = account.tickets,
                    "wallet connected"
                );
                *phase = Phase::Connected(Link {
                    ledger,
                    account: account.clone(),
                    epoch,
                });
                Ok(account)
            }
            Err(err) => {
                warn!(%err, "wallet connection failed");
                *phase = Phase::Disconnected;
                Err(err.into())
            }
        }
    }

    async fn establish(
        &self,
        kind: WalletKind,
        approval: Approval,
    ) -> std::result::Result<(C::Ledger, Account), ConnectionFailure> {
        let password = match approval {
            Approval::Granted { password } => password,
            Approval::Declined => {
                return Err(ConnectionFailure::rejected(
                    "user declined the connection prompt",
                ));
            }
        };
        let Connection { ledger, credential } =
            self.connector.connect(kind, password).await?;
        let balances = read_balances(&ledger).await?;
        let account = Account {
            address: ledger.account(),
            balance: balances.balance,
            tickets: balances.tickets,
            credential,
        };
        Ok((ledger, account))
    }

    pub fn disconnect(&self) {
        let mut phase = self.phase.borrow_mut();
        if !matches!(*phase, Phase::Disconnected) {
            info!("wallet disconnected");
        }
        self.bump_epoch();
        *phase = Phase::Disconnected;
    }

    /// Rejected locally, before any network call, when not connected, when a
    /// drop is already in flight, or when the wager is outside
    /// `[MIN_WAGER, balance]`.
    pub async fn drop_ball(&self, wager: U256) -> Result<DropResult> {
        let ledger = {
            let phase = self.phase.borrow();
            let Phase::Connected(link) = &*phase else {
                return Err(Precondition::NotConnected.into());
            };
            if self.drop_in_flight.get() {
                return Err(Precondition::DropInFlight.into());
            }
            check_wager(wager, link.account.balance)?;
            link.ledger.clone()
        };
        let _busy = BusyGuard::acquire(&self.drop_in_flight);
        info!(wager = %format_native(wager), "dropping ball");

        let receipt = ledger.submit(GameCall::DropBall { wager }).await?;
        receipt.ensure_succeeded()?;
        let outcome = find_ball_dropped(&receipt.logs, ledger.contract())
            .map_err(|e| TransactionFailure::Malformed(e.to_string()))?
            .ok_or(TransactionFailure::MissingEvent {
                tx_hash: receipt.tx_hash,
            })?;

        let result = DropResult {
            wager,
            multiplier: outcome.multiplier,
            payout: outcome.payout,
            tickets_awarded: whole_units_floor(outcome.payout),
            tx_hash: receipt.tx_hash,
        };
        info!(
            tx = %result.tx_hash,
            multiplier = %result.multiplier,
            payout = %format_native(result.payout),
            tickets = result.tickets_awarded,
            "ball landed"
        );
        Ok(result)
    }

    pub async fn settle_tickets(&self, amount: u64) -> Result<B256> {
        if amount == 0 {
            return Err(Precondition::ZeroTickets.into());
        }
        let ledger = self.connected_ledger()?;
        info!(amount, "settling tickets");
        let receipt = ledger
            .submit(GameCall::SettleTickets {
                amount: U256::from(amount),
            })
            .await?;
        receipt.ensure_succeeded()?;
        Ok(receipt.tx_hash)
    }

    /// The ticket check is local only; a concurrent settle can still make the
    /// remote call revert.
    pub async fn mint_nft(&self, toy_id: u64, ticket_cost: u64) -> Result<B256> {
        let ledger = {
            let phase = self.phase.borrow();
            let Phase::Connected(link) = &*phase else {
                return Err(Precondition::NotConnected.into());
            };
            if link.account.tickets < ticket_cost {
                return Err(Precondition::InsufficientTickets {
                    need: ticket_cost,
                    have: link.account.tickets,
                }
                .into());
            }
            link.ledger.clone()
        };
        info!(toy_id, ticket_cost, "minting toy");
        let receipt = ledger
            .submit(GameCall::MintNft {
                toy_id: U256::from(toy_id),
            })
            .await?;
        receipt.ensure_succeeded()?;
        Ok(receipt.tx_hash)
    }

    /// Reads both balances from the ledger and overwrites the cached values,
    /// unless a newer refresh already landed or the connection changed.
    pub async fn refresh_balances(&self) -> Result<Balances> {
        let (ledger, epoch) = {
            let phase = self.phase.borrow();
            let Phase::Connected(link) = &*phase else {
                return Err(Precondition::NotConnected.into());
            };
            (link.ledger.clone(), link.epoch)
        };
        let seq = self.refresh_issued.get() + 1;
        self.refresh_issued.set(seq);

        let balances = read_balances(&ledger).await?;

        let mut phase = self.phase.borrow_mut();
        match &mut *phase {
            Phase::Connected(link)
                if link.epoch == epoch && seq > self.refresh_applied.get() =>
            {
                link.account.balance = balances.balance;
                link.account.tickets = balances.tickets;
                self.refresh_applied.set(seq);
            }
            _ => debug!(seq, "discarding stale balance refresh"),
        }
        Ok(balances)
    }

    /// Returns false when `epoch` no longer matches the live connection.
    pub fn apply_optimistic(&self, epoch: Epoch, delta: BalanceDelta) -> bool {
        let mut phase = self.phase.borrow_mut();
        let Phase::Connected(link) = &mut *phase else {
            return false;
        };
        if link.epoch != epoch {
            return false;
        }
        let account = &mut link.account;
        account.balance = account
            .balance
            .saturating_sub(delta.debit)
            .saturating_add(delta.credit);
        account.tickets = account
            .tickets
            .saturating_add(delta.tickets_gained)
            .saturating_sub(delta.tickets_spent);
        true
    }

    fn connected_ledger(&self) -> Result<C::Ledger> {
        match &*self.phase.borrow() {
            Phase::Connected(link) => Ok(link.ledger.clone()),
            _ => Err(Precondition::NotConnected.into()),
        }
    }

    fn bump_epoch(&self) -> Epoch {
        let next = self.next_epoch.get() + 1;
        self.next_epoch.set(next);
        Epoch(next)
    }
}

pub fn check_wager(wager: U256, balance: U256) -> std::result::Result<(), Precondition> {
    if wager < MIN_WAGER {
        return Err(Precondition::WagerBelowMinimum {
            wager,
            minimum: MIN_WAGER,
        });
    }
    if wager > balance {
        return Err(Precondition::WagerAboveBalance { wager, balance });
    }
    Ok(())
}

async fn read_balances<L: GameLedger>(
    ledger: &L,
) -> std::result::Result<Balances, ReadFailure> {
    let (balance, tickets) =
        futures::try_join!(ledger.native_balance(), ledger.ticket_balance())?;
    Ok(Balances {
        balance,
        tickets: u64::try_from(tickets).unwrap_or(u64::MAX),
    })
}

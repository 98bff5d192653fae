//! Front for every user-initiated wallet operation.
//!
//! The orchestrator gates requests (no drop while one is outstanding or
//! without a credential), applies the optimistic balance change, asks for the
//! authoritative refresh, and reports everything to a [`GameObserver`]. No
//! error escapes: each is logged and reported as an event.

use alloy::primitives::{
    B256,
    U256,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{
    debug,
    warn,
};

use crate::{
    error::WalletError,
    ledger::Connector,
    session::{
        Account,
        Approval,
        BalanceDelta,
        DropResult,
        SessionState,
        WalletKind,
        WalletSession,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Connect,
    Settle,
    Mint,
    Refresh,
}

impl Action {
    pub fn label(self) -> &'static str {
        match self {
            Action::Connect => "connect",
            Action::Settle => "settle",
            Action::Mint => "mint",
            Action::Refresh => "refresh",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameEvent {
    Connecting(WalletKind),
    Connected(Account),
    Disconnected,
    DropRequested { wager: U256 },
    DropLanded(DropResult),
    DropFailed(WalletError),
    TicketsSettled { amount: u64, tx_hash: B256 },
    ToyMinted { toy_id: u64, tx_hash: B256 },
    BalancesChanged(Account),
    ActionFailed { action: Action, error: WalletError },
}

pub trait GameObserver {
    fn observe(&self, event: GameEvent);
}

impl GameObserver for UnboundedSender<GameEvent> {
    fn observe(&self, event: GameEvent) {
        if self.send(event).is_err() {
            debug!("game event receiver closed");
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropOutcome {
    /// Busy or not connected; nothing was sent and no event was emitted.
    Ignored,
    Landed(DropResult),
    Failed(WalletError),
}

pub struct DropOrchestrator<C: Connector, O> {
    session: WalletSession<C>,
    observer: O,
}

impl<C: Connector, O: GameObserver> DropOrchestrator<C, O> {
    pub fn new(session: WalletSession<C>, observer: O) -> Self {
        Self { session, observer }
    }

    pub fn session(&self) -> &WalletSession<C> {
        &self.session
    }

    /// What the Drop control should show.
    pub fn can_drop(&self) -> bool {
        self.session.state() == SessionState::Connected
    }

    pub async fn connect(&self, kind: WalletKind, approval: Approval) -> bool {
        self.observer.observe(GameEvent::Connecting(kind));
        match self.session.connect(kind, approval).await {
            Ok(account) => {
                self.observer.observe(GameEvent::Connected(account));
                true
            }
            Err(error) => {
                self.report_failure(Action::Connect, error);
                false
            }
        }
    }

    pub fn disconnect(&self) {
        self.session.disconnect();
        self.observer.observe(GameEvent::Disconnected);
    }

    pub async fn drop_ball(&self, wager: U256) -> DropOutcome {
        if !self.can_drop() {
            debug!(state = ?self.session.state(), "ignoring drop request");
            return DropOutcome::Ignored;
        }
        let Some(epoch) = self.session.epoch() else {
            return DropOutcome::Ignored;
        };
        self.observer.observe(GameEvent::DropRequested { wager });

        match self.session.drop_ball(wager).await {
            Ok(result) => {
                if self
                    .session
                    .apply_optimistic(epoch, BalanceDelta::for_drop(&result))
                {
                    self.publish_balances();
                }
                self.observer.observe(GameEvent::DropLanded(result.clone()));
                self.refresh().await;
                DropOutcome::Landed(result)
            }
            Err(error) => {
                warn!(%error, "drop failed");
                self.observer.observe(GameEvent::DropFailed(error.clone()));
                DropOutcome::Failed(error)
            }
        }
    }

    pub async fn settle(&self, amount: u64) -> bool {
        match self.session.settle_tickets(amount).await {
            Ok(tx_hash) => {
                self.observer
                    .observe(GameEvent::TicketsSettled { amount, tx_hash });
                self.refresh().await;
                true
            }
            Err(error) => {
                self.report_failure(Action::Settle, error);
                false
            }
        }
    }

    pub async fn mint(&self, toy_id: u64, ticket_cost: u64) -> bool {
        let epoch = self.session.epoch();
        match self.session.mint_nft(toy_id, ticket_cost).await {
            Ok(tx_hash) => {
                if let Some(epoch) = epoch
                    && self
                        .session
                        .apply_optimistic(epoch, BalanceDelta::for_mint(ticket_cost))
                {
                    self.publish_balances();
                }
                self.observer.observe(GameEvent::ToyMinted { toy_id, tx_hash });
                self.refresh().await;
                true
            }
            Err(error) => {
                self.report_failure(Action::Mint, error);
                false
            }
        }
    }

    pub async fn refresh(&self) {
        match self.session.refresh_balances().await {
            Ok(_) => self.publish_balances(),
            Err(error) => self.report_failure(Action::Refresh, error),
        }
    }

    fn publish_balances(&self) {
        if let Some(account) = self.session.account() {
            self.observer.observe(GameEvent::BalancesChanged(account));
        }
    }

    fn report_failure(&self, action: Action, error: WalletError) {
        warn!(action = action.label(), %error, "wallet action failed");
        self.observer.observe(GameEvent::ActionFailed { action, error });
    }
}

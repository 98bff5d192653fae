use crate::ui;
use alloy::primitives::{
    Address,
    U256,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use crossterm::event::EventStream;
use deployments::DeploymentStore;
use futures::StreamExt;
use stardrop::{
    ABI_SIGNATURES,
    amount::{
        MIN_WAGER,
        NATIVE_TICKER,
        clamp_wager,
        format_native,
        step_wager,
    },
    board::Board,
    chain::{
        ChainConnector,
        KeystoreLocation,
    },
    config::{
        NetworkTarget,
        Overrides,
        resolve_chain_settings,
    },
    cues::{
        Cue,
        Cues,
        TerminalBell,
    },
    orchestrator::{
        DropOrchestrator,
        GameEvent,
    },
    session::{
        Account,
        Approval,
        DropResult,
        SessionState,
        WalletKind,
        WalletSession,
    },
};
use std::{
    io::{
        Stdout,
        stdout,
    },
    path::PathBuf,
    rc::Rc,
    time::Duration,
};
use tokio::{
    sync::mpsc::{
        self,
        UnboundedReceiver,
        UnboundedSender,
    },
    task::LocalSet,
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::{
    error,
    info,
};

const ANIMATION_FRAME: Duration = Duration::from_millis(80);
const MAX_ERRORS: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Toy {
    pub id: u64,
    pub name: &'static str,
    pub ticket_cost: u64,
}

pub const TOY_CATALOG: [Toy; 3] = [
    Toy {
        id: 1,
        name: "Star Plush",
        ticket_cost: 5,
    },
    Toy {
        id: 2,
        name: "Comet Racer",
        ticket_cost: 10,
    },
    Toy {
        id: 3,
        name: "Nebula Drone",
        ticket_cost: 25,
    },
];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub overrides: Overrides,
    pub wallet_name: String,
    pub wallet_dir: PathBuf,
    pub receipt_poll: Duration,
    pub muted: bool,
}

type Orchestrator = DropOrchestrator<ChainConnector, UnboundedSender<GameEvent>>;

/// Everything the renderer needs for one frame.
#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub network: &'static str,
    pub contract: Address,
    pub wallet_name: String,
    pub state: SessionState,
    pub account: Option<Account>,
    pub can_drop: bool,
    pub wager: U256,
    pub board: Board,
    pub last_result: Option<DropResult>,
    pub muted: bool,
    pub status: String,
    pub errors: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct AppController {
    orchestrator: Rc<Orchestrator>,
    board: Board,
    cues: Cues<TerminalBell<Stdout>>,
    wager: U256,
    last_result: Option<DropResult>,
    status: String,
    errors: Vec<String>,
    network: &'static str,
    contract: Address,
    wallet_name: String,
}

impl AppController {
    pub fn new(config: AppConfig, events: UnboundedSender<GameEvent>) -> Result<Self> {
        let store = DeploymentStore::new(config.network.deployment_env())
            .map_err(|e| eyre!(e))
            .wrap_err("opening deployment store failed")?;
        let settings = resolve_chain_settings(
            config.network,
            &store,
            &ABI_SIGNATURES,
            config.overrides,
            config.receipt_poll,
        )?;
        info!(
            rpc = %settings.rpc_url,
            chain_id = settings.chain_id,
            contract = %settings.contract,
            "chain settings resolved"
        );
        let contract = settings.contract;
        let connector = ChainConnector::new(
            settings,
            KeystoreLocation {
                dir: config.wallet_dir,
                name: config.wallet_name.clone(),
            },
        );
        let orchestrator = DropOrchestrator::new(WalletSession::new(connector), events);
        let network = match config.network {
            NetworkTarget::Testnet => "testnet",
            NetworkTarget::Local => "local",
        };
        Ok(Self {
            orchestrator: Rc::new(orchestrator),
            board: Board::default(),
            cues: Cues::new(TerminalBell::new(stdout()), config.muted),
            wager: MIN_WAGER,
            last_result: None,
            status: "Press s to sign in with a session, c for a direct signer".into(),
            errors: Vec::new(),
            network,
            contract,
            wallet_name: config.wallet_name,
        })
    }

    pub fn build_snapshot(&self) -> AppSnapshot {
        let session = self.orchestrator.session();
        AppSnapshot {
            network: self.network,
            contract: self.contract,
            wallet_name: self.wallet_name.clone(),
            state: session.state(),
            account: session.account(),
            can_drop: self.orchestrator.can_drop(),
            wager: self.wager,
            board: self.board.clone(),
            last_result: self.last_result.clone(),
            muted: self.cues.is_muted(),
            status: self.status.clone(),
            errors: self.errors.clone(),
        }
    }

    fn can_connect(&self) -> bool {
        self.orchestrator.session().state() == SessionState::Disconnected
    }

    fn is_animating(&self) -> bool {
        self.board.is_animating()
    }

    fn balance(&self) -> U256 {
        self.orchestrator
            .session()
            .account()
            .map(|a| a.balance)
            .unwrap_or_default()
    }

    fn handle_game_event(&mut self, event: GameEvent) {
        match event {
            GameEvent::Connecting(kind) => {
                self.status = format!("Connecting ({})...", kind.label());
            }
            GameEvent::Connected(account) => {
                self.wager = clamp_wager(self.wager, account.balance);
                self.status = format!("Connected as {} ({})", account.address, account.kind().label());
            }
            GameEvent::Disconnected => {
                self.status = "Disconnected".into();
            }
            GameEvent::DropRequested { wager } => {
                self.board.drop_requested(wager);
                self.cues.play(Cue::Drop);
                self.status = format!(
                    "Dropping {} {NATIVE_TICKER}, waiting for confirmation...",
                    format_native(wager)
                );
            }
            GameEvent::DropLanded(result) => {
                self.board.drop_resolved(&result, &mut rand::rng());
                self.status = format!("Transaction confirmed: {}", result.tx_hash);
            }
            GameEvent::DropFailed(err) => {
                self.board.drop_failed();
                self.status = "Drop failed".into();
                self.push_errors(vec![format!("drop failed: {err}")]);
            }
            GameEvent::TicketsSettled { amount, tx_hash } => {
                self.status = format!("Settled {amount} tickets ({tx_hash})");
            }
            GameEvent::ToyMinted { toy_id, tx_hash } => {
                let name = TOY_CATALOG
                    .iter()
                    .find(|toy| toy.id == toy_id)
                    .map_or("toy", |toy| toy.name);
                self.status = format!("Minted {name} ({tx_hash})");
            }
            GameEvent::BalancesChanged(account) => {
                self.wager = clamp_wager(self.wager, account.balance);
            }
            GameEvent::ActionFailed { action, error } => {
                self.status = format!("{} failed", action.label());
                self.push_errors(vec![format!("{} failed: {error}", action.label())]);
            }
        }
    }

    fn tick(&mut self) {
        let Some(landing) = self.board.tick() else {
            return;
        };
        self.cues.play(Cue::for_result(&landing.result));
        self.status = format!(
            "Landed on {}x: payout {} {NATIVE_TICKER}, +{} tickets",
            landing.result.multiplier,
            format_native(landing.result.payout),
            landing.result.tickets_awarded
        );
        self.last_result = Some(landing.result);
    }

    fn handle_user_event(&mut self, event: ui::UserEvent) -> Flow {
        use ui::UserEvent;
        match event {
            UserEvent::Quit => return Flow::Quit,
            UserEvent::Redraw => {}
            UserEvent::Connect { kind, approval } => self.spawn_connect(kind, approval),
            UserEvent::Disconnect => self.orchestrator.disconnect(),
            UserEvent::Drop => {
                if self.orchestrator.can_drop() {
                    let orchestrator = Rc::clone(&self.orchestrator);
                    let wager = self.wager;
                    tokio::task::spawn_local(async move {
                        orchestrator.drop_ball(wager).await;
                    });
                } else if self.orchestrator.session().is_drop_in_flight() {
                    self.status = "A drop is already in flight".into();
                } else {
                    self.status = "Connect a wallet before dropping".into();
                }
            }
            UserEvent::WagerUp => self.wager = step_wager(self.wager, true, self.balance()),
            UserEvent::WagerDown => self.wager = step_wager(self.wager, false, self.balance()),
            UserEvent::SetWager(wager) => {
                self.wager = clamp_wager(wager, self.balance());
                if self.wager != wager {
                    self.status = format!(
                        "Wager adjusted to {} {NATIVE_TICKER}",
                        format_native(self.wager)
                    );
                }
            }
            UserEvent::ToggleMute => {
                let muted = self.cues.toggle_mute();
                self.status = if muted { "Sound muted" } else { "Sound on" }.into();
            }
            UserEvent::Settle(amount) => {
                let orchestrator = Rc::clone(&self.orchestrator);
                self.status = format!("Settling {amount} tickets...");
                tokio::task::spawn_local(async move {
                    orchestrator.settle(amount).await;
                });
            }
            UserEvent::Mint(idx) => {
                let Some(toy) = TOY_CATALOG.get(idx).copied() else {
                    return Flow::Continue;
                };
                let orchestrator = Rc::clone(&self.orchestrator);
                self.status = format!("Minting {}...", toy.name);
                tokio::task::spawn_local(async move {
                    orchestrator.mint(toy.id, toy.ticket_cost).await;
                });
            }
            UserEvent::Refresh => {
                let orchestrator = Rc::clone(&self.orchestrator);
                tokio::task::spawn_local(async move {
                    orchestrator.refresh().await;
                });
            }
        }
        Flow::Continue
    }

    fn spawn_connect(&self, kind: WalletKind, approval: Approval) {
        let orchestrator = Rc::clone(&self.orchestrator);
        tokio::task::spawn_local(async move {
            orchestrator.connect(kind, approval).await;
        });
    }

    fn push_errors(&mut self, mut items: Vec<String>) {
        if items.is_empty() {
            return;
        }
        for item in &items {
            error!("{}", item);
        }
        self.errors.append(&mut items);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let controller = AppController::new(config, events_tx)?;
    let local = LocalSet::new();
    local
        .run_until(async move {
            let mut terminal = ui::TerminalSession::enter()?;
            run_loop(controller, &mut terminal, events_rx).await
        })
        .await
}

async fn run_loop(
    mut controller: AppController,
    terminal: &mut ui::TerminalSession,
    mut events_rx: UnboundedReceiver<GameEvent>,
) -> Result<()> {
    tracing::info!("Running app loop");
    let mut ui_state = ui::UiState::default();
    let mut input_events = EventStream::new();
    let mut ticker = time::interval(ANIMATION_FRAME);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    terminal.draw(&ui_state, &controller.build_snapshot())?;

    loop {
        tokio::select! {
            Some(event) = events_rx.recv() => {
                controller.handle_game_event(event);
            }
            _ = ticker.tick(), if controller.is_animating() => {
                controller.tick();
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw = input_events.next() => {
                let Some(raw) = raw else {
                    break;
                };
                let event = raw.wrap_err("reading terminal input failed")?;
                let Some(user_event) =
                    ui::interpret_event(&mut ui_state, event, controller.can_connect())
                else {
                    continue;
                };
                if controller.handle_user_event(user_event) == Flow::Quit {
                    break;
                }
            }
        }
        terminal
            .draw(&ui_state, &controller.build_snapshot())
            .wrap_err("draw failed")?;
    }
    info!("Exiting app loop");
    Ok(())
}

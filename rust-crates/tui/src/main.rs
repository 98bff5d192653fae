use alloy::primitives::Address;
use clap::{
    ArgGroup,
    Parser,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use stardrop::{
    config::{
        NetworkTarget,
        Overrides,
    },
    wallets,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

mod client;
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "stardrop",
    version,
    about = "Terminal client for the StarDrop plinko game",
    long_about = None,
    group(
        ArgGroup::new("network")
            .args(["local", "testnet"])
            .required(true)
    )
)]
struct Args {
    /// Local dev chain (default RPC http://localhost:8545)
    #[arg(long)]
    local: bool,

    /// Abstract testnet (default RPC https://api.testnet.abs.xyz)
    #[arg(long)]
    testnet: bool,

    #[arg(long, env = "STARDROP_RPC_URL")]
    rpc_url: Option<String>,

    /// Game contract; overrides the deployment record
    #[arg(long)]
    contract: Option<Address>,

    #[arg(long)]
    chain_id: Option<u64>,

    /// Keystore file name inside the wallet directory
    #[arg(long, env = "STARDROP_WALLET")]
    wallet: String,

    /// Defaults to ~/.foundry/keystores
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Session service used by the session (smart account) sign-in
    #[arg(long, env = "STARDROP_SESSION_SERVICE_URL")]
    session_service_url: Option<String>,

    #[arg(long, default_value_t = 750)]
    receipt_poll_ms: u64,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Start with sound cues muted
    #[arg(long)]
    mute: bool,
}

impl Args {
    fn into_config(self) -> Result<client::AppConfig> {
        let network = if self.local {
            NetworkTarget::Local
        } else {
            NetworkTarget::Testnet
        };
        let wallet_dir = wallets::resolve_wallet_dir(self.wallet_dir.as_deref())?;
        Ok(client::AppConfig {
            network,
            overrides: Overrides {
                rpc_url: self.rpc_url,
                contract: self.contract,
                chain_id: self.chain_id,
                session_service_url: self.session_service_url,
            },
            wallet_name: self.wallet,
            wallet_dir,
            receipt_poll: Duration::from_millis(self.receipt_poll_ms.max(1)),
            muted: self.mute,
        })
    }
}

/// The terminal belongs to the UI, so logs go to a daily file.
fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    let appender = rolling::daily(log_dir, "stardrop.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("installing log subscriber failed: {e}"))?;
    Ok(guard)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let _log_guard = init_tracing(&args.log_dir)?;
    tracing::info!("starting stardrop client");
    let config = args.into_config().wrap_err("invalid command line")?;
    client::run_app(config).await
}

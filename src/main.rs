//! Friendbot - test network funding service
//!
//! Loads configuration, bootstraps the minion pool against the configured
//! ledger backend, then serves funding requests over HTTP until Ctrl-C.

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use friendbot::bootstrap::init_friendbot;
use friendbot::config::Config;
use friendbot::ledger::{HorizonClient, LedgerBackend, RpcClient};
use friendbot::minion::FundingContext;
use friendbot::server::ServerState;
use friendbot::wallet::Keypair;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "FRIENDBOT_CONFIG", default_value = "friendbot.cfg")]
    config: PathBuf,

    /// Listen port, overriding the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.json_logs)?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting friendbot");
    info!(path = %args.config.display(), "loading configuration");
    let mut config = Config::load(Some(&args.config)).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }

    let backend = build_backend(&config)?;
    info!(backend = backend.name(), "ledger backend selected");

    let funder = Keypair::from_secret(&config.friendbot_secret).context("Invalid friendbot_secret")?;
    let context = FundingContext {
        funder,
        network_passphrase: config.network_passphrase.clone(),
        starting_balance: config.starting_balance_stroops()?,
        base_fee: config.base_fee,
    };
    let settings = config.bootstrap_settings()?;
    let bot = init_friendbot(backend, context, &settings)
        .await
        .context("creating minion accounts")?;
    info!(minions = bot.len(), "friendbot ready");

    let app = ServerState::new(Arc::new(bot)).router();
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("shut down gracefully");
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_filter = if verbose {
        "friendbot=debug,info"
    } else {
        "friendbot=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

fn build_backend(config: &Config) -> Result<LedgerBackend> {
    let backend = match &config.rpc_url {
        Some(url) => LedgerBackend::Rpc(
            RpcClient::new(url.as_str(), config.request_timeout(), config.poll_config())
                .context("Failed to create RPC client")?,
        ),
        None => LedgerBackend::Horizon(
            HorizonClient::new(config.horizon_url.as_str(), config.request_timeout())
                .context("Failed to create Horizon client")?,
        ),
    };
    Ok(backend)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}

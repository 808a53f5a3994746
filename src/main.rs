//! # Store Communications Entry Point

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use storecomms::{config::ConfigLoader, server::run_server, telemetry::init_tracing};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "storecomms", version, about = "Store announcements and directory imports")]
struct Cli {
    /// Directory holding the layered `.env` files
    #[arg(long, value_name = "PATH")]
    env_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_loader = match cli.env_dir {
        Some(dir) => ConfigLoader::with_base_dir(dir),
        None => ConfigLoader::new(),
    };
    let config = config_loader.load().context("failed to load configuration")?;

    init_tracing(&config).context("failed to initialize tracing")?;
    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        info!(config = %redacted_json, "Effective configuration");
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        signal.cancel();
    });

    run_server(config, shutdown).await
}

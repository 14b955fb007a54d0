//! sigcast - signal broadcast and execution engine, console entry point.

use anyhow::Result;
use clap::Parser;
use sigcast_bot::{console, AppConfig, Application, ConsoleSink};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Trading signal broadcast engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SIGCAST_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    sigcast_telemetry::init_logging()?;

    info!("Starting sigcast v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > SIGCAST_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("SIGCAST_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = AppConfig::load(&config_path)?;
    info!(
        max_concurrency = config.broadcast.max_concurrency,
        window_secs = config.confirmation.window_secs,
        seeds = config.subscribers.len(),
        "Configuration loaded"
    );

    let mut app = Application::new(config, Arc::new(ConsoleSink))?;
    let cancel = CancellationToken::new();
    let background = app.spawn_background(cancel.clone());

    tokio::select! {
        result = console::run(&app, BufReader::new(tokio::io::stdin())) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
    }

    // Pending offers are abandoned; queued notifications get the grace period.
    cancel.cancel();
    for task in background {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    info!("sigcast stopped");
    Ok(())
}

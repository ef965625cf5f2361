//! # cw-runner
//!
//! Main entry point for candlewick.
//!
//! Loads a JSON configuration file, connects to the shared store, builds one
//! candle streaming session per configured exchange for the selected run mode,
//! and runs them until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! cw-runner config.json all --log-level info
//! cw-runner config.json mutual --log-dir /var/log/cw
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cw_core::ratelimit::LockTiming;
use cw_core::store::RedisStore;
use cw_core::ws::TungsteniteConnector;
use cw_md::commands::{self, RunMode};
use cw_md::context::ServiceContext;
use tracing::{error, info, warn};

/// Multi-exchange 1-minute candle ingestion.
#[derive(Parser)]
#[command(name = "cw-runner", about = "Multi-exchange 1-minute candle ingestion")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Run mode: `all` or `mutual`.
    run_mode: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output (overrides `service.log_path`).
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mode: RunMode = cli.run_mode.parse()?;

    // 1. Load configuration
    let config = cw_core::config::load_config(&cli.config)?;

    // 2. Initialize logging
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    cw_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.module_name(), config.log_format())?;
    info!(
        "cw-runner starting: config={}, mode={mode:?}, {} exchange(s)",
        cli.config.display(),
        config.exchanges.len()
    );

    // 3. Shared services
    let store = RedisStore::connect(&config.store.url)
        .await
        .context("failed to connect to the shared store")?;
    if !store.health_check().await? {
        warn!("shared store did not answer PING as expected");
    }
    let http = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
    let lock_timing = LockTiming { lease: config.store.lock_lease(), wait: config.store.lock_wait() };
    let ctx = ServiceContext::new(Arc::new(store), http, Arc::new(TungsteniteConnector), lock_timing);

    // 4. Build and start sessions
    let mut sessions = commands::build_sessions(&ctx, &config, mode).await?;
    for session in &mut sessions {
        session.start().await?;
        info!("module '{}' started", session.name());
    }
    info!("all {} module(s) started, press Ctrl+C to stop", sessions.len());

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    for session in &mut sessions {
        info!("stopping module '{}'", session.name());
        if let Err(e) = session.stop().await {
            error!("error stopping '{}': {e}", session.name());
        }
    }

    info!("all modules stopped");
    Ok(())
}

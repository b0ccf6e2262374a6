//! SPINLAB: roulette betting-strategy replay and settlement engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! runs the configured strategy against the configured outcome source, and
//! reports the result. Ctrl+C cancels the run gracefully.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use spinlab::config::AppConfig;
use spinlab::dashboard;
use spinlab::engine::RunHandle;
use spinlab::storage::LocalRepository;
use spinlab::strategy::load_strategy;

const DEFAULT_CONFIG: &str = "spinlab.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    let base_dir = Path::new(&config_path)
        .parent()
        .unwrap_or_else(|| Path::new("."));
    let run_config = cfg.run_config(base_dir)?;

    info!(
        config = %config_path,
        bankroll = %run_config.starting_bankroll,
        max_spins = run_config.max_spins,
        table = %run_config.table,
        storage = %cfg.storage.root,
        "SPINLAB starting up"
    );

    let repository = Arc::new(LocalRepository::new(&cfg.storage.root));
    let handle = Arc::new(RunHandle::new(repository));

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(Arc::clone(&handle), cfg.dashboard.port).await?;
    }

    let strategy = load_strategy(&cfg.strategy).context("Failed to load strategy")?;
    let run_id = handle
        .start(run_config, strategy)
        .await
        .context("Failed to start run")?;

    let snapshot = tokio::select! {
        snapshot = handle.wait() => snapshot,
        _ = tokio::signal::ctrl_c() => {
            warn!("Shutdown signal received, cancelling run");
            handle.cancel();
            handle.wait().await
        }
    };

    let metrics = &snapshot.metrics;
    info!(
        %run_id,
        status = %snapshot.status,
        spins = snapshot.records.len(),
        bankroll = format!("${:.2}", snapshot.bankroll),
        profit = format!("${:.2}", metrics.total_profit),
        win_rate = format!("{:.1}%", metrics.win_rate * 100.0),
        "SPINLAB shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("spinlab=info,strategy=info"));

    let json_logging = std::env::var("SPINLAB_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

//! mqttsink - log MQTT messages to a database with device discovery.
//!
//! Runs an indefinite receive loop under external supervision: a clean
//! shutdown is requested through the quit-marker file, and any fault
//! exits the process after a cooldown so the supervisor can restart it
//! without hammering an unhealthy broker or database.

mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mqttsink_bridge::{Session, ShutdownSentinel};
use mqttsink_store::{DryRunStore, MySqlStore, Store};

use config::{Args, ResolvedConfig, StoreConfig};

/// Cooldown before exiting on a fault, bounding supervisor restart
/// frequency while the broker or database is unhealthy.
const FAULT_COOLDOWN: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = match config::resolve(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(1);
        }
    };

    info!(
        host = %cfg.session.host,
        port = cfg.session.port,
        topics = ?cfg.session.topics,
        devices_only = cfg.session.devices_only,
        "mqttsink starts"
    );

    match run(cfg).await {
        Ok(()) => {
            info!("session ended cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "session failed, cooling down before exit");
            tokio::time::sleep(FAULT_COOLDOWN).await;
            ExitCode::from(2)
        }
    }
}

async fn run(cfg: ResolvedConfig) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = match cfg.store {
        StoreConfig::DryRun {
            message_table,
            device_table,
        } => {
            info!("dry run, statements will be logged but not executed");
            Arc::new(DryRunStore::new(message_table, device_table))
        }
        StoreConfig::MySql(db) => Arc::new(MySqlStore::connect(&db).await?),
    };

    if cfg.session.topics.is_empty() {
        warn!("no topics configured, relying on the status wildcard only");
    }

    let sentinel = ShutdownSentinel::for_program(env!("CARGO_PKG_NAME"));
    info!(marker = %sentinel.marker().display(), "watching quit marker");

    let mut session = Session::new(cfg.session, store, sentinel);
    session.run().await?;
    Ok(())
}

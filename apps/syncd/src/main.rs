//! journal-syncd: runs the journal auto-sync loop until interrupted.
//!
//! Environment variables:
//!   JOURNAL_REMOTE_URL - hosted backend project URL (unset runs local-only)
//!   JOURNAL_REMOTE_API_KEY - API key sent as `apikey` and bearer token
//!   JOURNAL_DB_PATH - data directory for the SQLite database (unset keeps data in memory)
//!   JOURNAL_DISPLAY_NAME - profile to sync
//!   JOURNAL_OPERATOR_MODE - `true` to refresh the operator aggregate on forced passes
//!   JOURNAL_SYNC_INITIAL_DELAY_SECS / JOURNAL_SYNC_INTERVAL_SECS - timer overrides

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use journal_core::storage::{LocalStore, MemoryLocalStore};
use journal_core::SystemClock;
use journal_storage_sqlite::{db, SqliteLocalStore};
use journal_sync::{StaticIdentity, SyncConfig, SyncContext};

fn open_local_store(config: &SyncConfig) -> anyhow::Result<Arc<dyn LocalStore>> {
    let Some(dir) = config.db_path.as_deref() else {
        warn!("JOURNAL_DB_PATH is not set, journal data will not survive a restart");
        return Ok(Arc::new(MemoryLocalStore::new()));
    };
    let dir = dir
        .to_str()
        .context("JOURNAL_DB_PATH is not valid UTF-8")?;
    let db_path = db::init(dir).context("Failed to prepare data directory")?;
    let store = SqliteLocalStore::open(&db_path).context("Failed to open journal database")?;
    info!("Journal database at {}", db_path);
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SyncConfig::from_env();
    let local = open_local_store(&config)?;
    let identity = Arc::new(StaticIdentity::new(config.display_name.clone()));
    let context = SyncContext::from_config(&config, local, Arc::new(SystemClock), identity);
    let services = context.services(config.scheduler_settings(), config.operator_mode);

    if services.scheduler.start().await {
        info!(
            "Auto-sync running for '{}'",
            config.display_name.as_deref().unwrap_or_default()
        );
    } else {
        info!(
            "Auto-sync idle ({})",
            services.scheduler.describe_status()
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    services.scheduler.stop().await;
    info!("Shutting down, last status: {}", services.scheduler.describe_status());
    Ok(())
}

//! Společný start binárek: tracing, single-instance lock, sestavení pipeline

use anyhow::{Context, Result};
use logger::EventLogger;
use race_reconciler::{MeetingPipeline, Reconciler, RunConfig};
use race_scraper::ChromeSource;
use race_store::SqliteStore;
use std::env;
use std::fs::File;
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

pub type ChromePipeline = MeetingPipeline<ChromeSource, SqliteStore>;

pub fn init_tracing() {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();
}

/// Refresh i backfilly sdílí jeden lock – nad stejnými dostihy nikdy neběží dva procesy
pub fn instance_lock() -> Option<fd_lock::RwLock<File>> {
    let lock_file_path = env::temp_dir().join("greyhound_fields.lock");
    match File::create(&lock_file_path) {
        Ok(f) => Some(fd_lock::RwLock::new(f)),
        Err(e) => {
            warn!("Failed to create lock file at {:?}: {}", lock_file_path, e);
            None
        }
    }
}

pub fn build_pipeline(cfg: &RunConfig) -> Result<ChromePipeline> {
    let store = SqliteStore::open(&cfg.db_path)
        .with_context(|| format!("open race store at {}", cfg.db_path.display()))?;
    let reconciler = Reconciler::new(store, cfg.utc_offset, cfg.match_policy);
    let source = ChromeSource::new(cfg.browser.clone());

    Ok(MeetingPipeline::new(source, reconciler, EventLogger::new(&cfg.log_dir))
        .with_ntfy(cfg.ntfy_url.clone())
        .with_index_days(cfg.index_days))
}

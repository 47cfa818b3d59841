/// Greyhound fields - full refresh
///
/// Co dělá:
///   1. Form-guide přehled → fields všech mítinků na dnes a zítra
///   2. Odstartované dostihy → closed
///   3. Výsledky za včera a dnes → umístění, SP, top_2_in_top_2
///
/// Spuštění (cron):
///   cargo run --bin race-refresh

mod runtime;

use anyhow::Result;
use chrono::Utc;
use dotenv::dotenv;
use race_reconciler::RunConfig;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    runtime::init_tracing();

    let cfg = RunConfig::from_env()?;

    info!("=== Greyhound fields refresh ===");
    info!("DB: {}", cfg.db_path.display());
    info!("Logs: {}", cfg.log_dir.display());
    info!("Venue offset: {}", cfg.utc_offset);

    // Single instance lock
    let Some(mut lock) = runtime::instance_lock() else {
        return Ok(());
    };
    let _write_guard = match lock.try_write() {
        Ok(guard) => {
            info!("Acquired single-instance lock.");
            guard
        }
        Err(_) => {
            warn!("Another race job is already running! Exiting.");
            return Ok(());
        }
    };

    let mut pipeline = runtime::build_pipeline(&cfg)?;
    let summary = pipeline.full_refresh(Utc::now()).await?;

    info!(
        "Refresh complete: {} races upserted, {} closed, {} resulted",
        summary.races_upserted, summary.races_closed, summary.races_resulted
    );
    Ok(())
}

/// Greyhound fields - backfilly
///
/// Spuštění:
///   cargo run --bin race-backfill -- results 7            (posledních 7 dnů)
///   cargo run --bin race-backfill -- results 2026-01-21
///   cargo run --bin race-backfill -- fields 3             (dostihy bez běžců / bez vzdálenosti)
///   cargo run --bin race-backfill -- archive 2            (den před 2 dny přes archiv výsledků)
///   cargo run --bin race-backfill -- restat               (přepočet top_2_in_top_2)

mod runtime;

use anyhow::{bail, Result};
use chrono::Utc;
use dotenv::dotenv;
use race_reconciler::{BackfillWindow, RunConfig};
use race_scraper::timing::local_today;
use std::env;
use tracing::{info, warn};

const USAGE: &str = "usage: race-backfill <results|fields|archive> <days|YYYY-MM-DD> | race-backfill restat";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    runtime::init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let mode = args.first().map(String::as_str).unwrap_or_default();
    let window = match args.get(1) {
        Some(raw) => BackfillWindow::parse(raw)?,
        None => BackfillWindow::DaysBack(if mode == "archive" { 2 } else { 7 }),
    };
    if !matches!(mode, "results" | "fields" | "archive" | "restat") {
        bail!("{USAGE}");
    }

    let cfg = RunConfig::from_env()?;

    // Single instance lock
    let Some(mut lock) = runtime::instance_lock() else {
        return Ok(());
    };
    let _write_guard = match lock.try_write() {
        Ok(guard) => guard,
        Err(_) => {
            warn!("Another race job is already running! Exiting.");
            return Ok(());
        }
    };

    let mut pipeline = runtime::build_pipeline(&cfg)?;
    let now = Utc::now();

    info!("=== Backfill: {} {:?} ===", mode, window);
    let summary = match mode {
        "results" => pipeline.backfill_results(window, now).await?,
        "fields" => pipeline.backfill_fields(window, now).await?,
        "archive" => {
            let day = window.single_day(local_today(now, cfg.utc_offset))?;
            pipeline.backfill_archive(day, now).await?
        }
        _ => pipeline.restat()?,
    };

    info!(
        "Backfill '{}' complete: {} meetings, {} upserted, {} resulted, {} stats rewritten",
        summary.mode, summary.meetings_seen, summary.races_upserted, summary.races_resulted, summary.stats_rewritten
    );
    Ok(())
}

/// Greyhound fields - Logger
/// JSONL event stream, NTFY alerts

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        fs::create_dir_all(&dir).ok();
        Self { log_dir: dir }
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let date  = Utc::now().format("%Y-%m-%d").to_string();
        let path  = self.log_dir.join(format!("{date}.jsonl"));
        let line  = serde_json::to_string(event)?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open event log {}", path.display()))?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    /// Logování nesmí shodit běh – chyba zápisu jen do tracingu
    pub fn record<T: Serialize>(&self, event: &T) {
        if let Err(e) = self.log(event) {
            tracing::warn!("Event log write failed: {:#}", e);
        }
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event typy ────────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct RaceUpsertedEvent {
    pub ts:                  String,
    pub event:               &'static str,   // "RACE_UPSERTED"
    pub meeting_name:        String,
    pub race_number:         u32,
    pub race_date:           String,         // YYYY-MM-DD
    pub race_time:           String,         // RFC 3339, kanonický offset
    pub time_known:          bool,
    pub active_runner_count: u32,
    pub scratched:           u32,
    pub replaced:            usize,
    pub runner_failures:     usize,
}

#[derive(Serialize, Debug)]
pub struct ResultsAppliedEvent {
    pub ts:             String,
    pub event:          &'static str,   // "RESULTS_APPLIED"
    pub meeting_name:   String,
    pub race_number:    u32,
    pub race_id:        i64,
    pub race_date:      String,
    pub match_kind:     &'static str,   // "single" | "confirmed" | "fallback"
    pub matched:        usize,
    pub unmatched:      Vec<String>,    // "Dog Name (box)"
    pub all_prices_missing: bool,       // žádná nenulová SP → výsledky uložené, bez statistiky
    pub top_2_in_top_2: Option<bool>,   // null = nelze vyhodnotit
}

#[derive(Serialize, Debug)]
pub struct AmbiguousRaceMatchEvent {
    pub ts:            String,
    pub event:         &'static str,   // "AMBIGUOUS_RACE_MATCH"
    pub meeting_name:  String,
    pub race_number:   u32,
    pub candidates:    Vec<String>,    // data kandidátů, nejnovější první
    pub chosen_date:   Option<String>, // null = výsledky nezapsány, nikdo ještě neodstartoval
    pub confirmations: u32,            // nejlepší počet potvrzených jmen
}

#[derive(Serialize, Debug)]
pub struct MeetingSkippedEvent {
    pub ts:           String,
    pub event:        &'static str,   // "MEETING_SKIPPED"
    pub meeting_name: String,
    pub url:          String,
    pub stage:        &'static str,   // "fields" | "results" | "index" | "archive"
    pub reason:       String,
}

#[derive(Serialize, Debug, Default)]
pub struct RunSummaryEvent {
    pub ts:               String,
    pub event:            &'static str,   // "RUN_SUMMARY"
    pub mode:             String,         // "refresh" | "backfill-results" | …
    pub meetings_seen:    usize,
    pub meetings_skipped: usize,
    pub races_upserted:   usize,
    pub races_skipped:    usize,
    pub races_closed:     usize,
    pub races_resulted:   usize,
    pub races_not_found:  usize,
    pub races_unresolved: usize,
    pub fallback_matches: usize,
    pub stats_rewritten:  usize,
}

/// Pošli čitelný push alert
pub async fn send_ntfy_alert(url: &str, msg: &str, title: &str) {
    let client = reqwest::Client::new();
    match client
        .post(url)
        .header("Title", title)
        .header("Priority", "default")
        .header("Tags", "dog")
        .body(msg.to_string())
        .send()
        .await
    {
        Ok(_)  => tracing::info!("NTFY sent: {}", title),
        Err(e) => tracing::warn!("NTFY failed: {}", e),
    }
}

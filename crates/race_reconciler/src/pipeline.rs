//! Orchestrace běhů: refresh a backfilly
//!
//! Mítinky jdou sekvenčně, fields se uloží dřív, než se sahá na výsledky.
//! Výpadek jednoho mítinku se zaloguje a běh pokračuje dalším.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Days, FixedOffset, NaiveDate, Utc};
use logger::{
    now_iso, send_ntfy_alert, AmbiguousRaceMatchEvent, EventLogger, MeetingSkippedEvent, RaceUpsertedEvent,
    ResultsAppliedEvent, RunSummaryEvent,
};
use race_scraper::timing::{local_now, local_today};
use race_scraper::urls::{
    fields_to_results_url, has_real_meeting_id, reconstruct_fields_url, results_archive_url, FORM_GUIDE_URL,
};
use race_scraper::{
    discover_archive_meetings, discover_meetings, parse_meeting_fields, MeetingFields, PageSource, RaceResults,
    FIELDS_MARKER, INDEX_MARKER,
};
use race_store::{RaceRecord, RaceStatus, RaceStore};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::reconcile::{FieldOutcome, RaceMatch, Reconciler, ResultsApplied};

/// Marker archivu výsledků – odkazy na jednotlivé mítinky
const ARCHIVE_MARKER: &str = r#"a[href*="/results/"]"#;

/// Časové okno backfillu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillWindow {
    /// Posledních N dnů včetně dneška
    DaysBack(u32),
    On(NaiveDate),
}

impl BackfillWindow {
    /// "7" → 7 dnů zpět, "2026-01-21" → konkrétní den
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Ok(days) = raw.parse::<u32>() {
            return Ok(BackfillWindow::DaysBack(days));
        }
        match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Ok(BackfillWindow::On(date)),
            Err(_) => bail!("Expected a number of days or YYYY-MM-DD, got '{}'", raw),
        }
    }

    pub fn bounds(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
        match self {
            BackfillWindow::DaysBack(days) => Ok((days_before(today, *days)?, today)),
            BackfillWindow::On(date) => Ok((*date, *date)),
        }
    }

    /// Jeden den pro archiv: N = "před N dny"
    pub fn single_day(&self, today: NaiveDate) -> Result<NaiveDate> {
        match self {
            BackfillWindow::DaysBack(days) => days_before(today, *days),
            BackfillWindow::On(date) => Ok(*date),
        }
    }
}

fn days_before(today: NaiveDate, days: u32) -> Result<NaiveDate> {
    match today.checked_sub_days(Days::new(u64::from(days))) {
        Some(date) => Ok(date),
        None => bail!("Backfill window of {} days reaches before the supported calendar", days),
    }
}

pub struct MeetingPipeline<P: PageSource, S: RaceStore> {
    source: P,
    reconciler: Reconciler<S>,
    events: EventLogger,
    ntfy_url: Option<String>,
    index_days: usize,
}

impl<P: PageSource, S: RaceStore> MeetingPipeline<P, S> {
    pub fn new(source: P, reconciler: Reconciler<S>, events: EventLogger) -> Self {
        Self {
            source,
            reconciler,
            events,
            ntfy_url: None,
            index_days: 2,
        }
    }

    pub fn with_ntfy(mut self, url: Option<String>) -> Self {
        self.ntfy_url = url;
        self
    }

    pub fn with_index_days(mut self, days: usize) -> Self {
        self.index_days = days;
        self
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    fn summary(mode: &str) -> RunSummaryEvent {
        RunSummaryEvent {
            ts: now_iso(),
            event: "RUN_SUMMARY",
            mode: mode.to_string(),
            ..Default::default()
        }
    }

    fn finish(&self, mut summary: RunSummaryEvent) -> RunSummaryEvent {
        summary.ts = now_iso();
        info!(
            "Run '{}' done: {} meetings ({} skipped), {} races upserted, {} resulted, {} not found, {} fallbacks, {} unresolved",
            summary.mode,
            summary.meetings_seen,
            summary.meetings_skipped,
            summary.races_upserted,
            summary.races_resulted,
            summary.races_not_found,
            summary.fallback_matches,
            summary.races_unresolved
        );
        self.events.record(&summary);
        summary
    }

    fn skip_meeting(&self, summary: &mut RunSummaryEvent, meeting_name: &str, url: &str, stage: &'static str, reason: &str) {
        warn!("Skipping {} ({}) at {}: {}", meeting_name, url, stage, reason);
        summary.meetings_skipped += 1;
        self.events.record(&MeetingSkippedEvent {
            ts: now_iso(),
            event: "MEETING_SKIPPED",
            meeting_name: meeting_name.to_string(),
            url: url.to_string(),
            stage,
            reason: reason.to_string(),
        });
    }

    /// Přehled → fields všech mítinků → close pass → výsledky za včera a dnes
    pub async fn full_refresh(&mut self, now: DateTime<Utc>) -> Result<RunSummaryEvent> {
        let mut summary = Self::summary("refresh");
        let offset = self.reconciler.offset();

        match self.source.render(FORM_GUIDE_URL, INDEX_MARKER).await {
            Some(html) => {
                let meetings = discover_meetings(&html, self.index_days);
                for meeting in meetings {
                    self.ingest_meeting_fields(&meeting.name, &meeting.fields_url, &mut summary).await;
                }
            }
            None => self.skip_meeting(&mut summary, "form guide index", FORM_GUIDE_URL, "index", "fetch failed"),
        }

        let local = local_now(now, offset);
        match self.reconciler.close_started(local) {
            Ok(closed) => summary.races_closed = closed,
            Err(e) => warn!("Close pass failed: {:#}", e),
        }

        let today = local_today(now, offset);
        let yesterday = today - Days::new(1);
        self.results_for_window(yesterday, today, local, &mut summary).await?;

        Ok(self.finish(summary))
    }

    /// Fields jednoho mítinku → reconciler. None = stránka nebo datum chybí.
    pub async fn ingest_meeting_fields(
        &mut self,
        meeting_name: &str,
        fields_url: &str,
        summary: &mut RunSummaryEvent,
    ) -> Option<MeetingFields> {
        summary.meetings_seen += 1;
        info!("Fetching {}...", meeting_name);

        let Some(html) = self.source.render(fields_url, FIELDS_MARKER).await else {
            self.skip_meeting(summary, meeting_name, fields_url, "fields", "fetch failed");
            return None;
        };
        let Some(meeting) = parse_meeting_fields(&html, meeting_name, fields_url) else {
            self.skip_meeting(summary, meeting_name, fields_url, "fields", "meeting date not found");
            return None;
        };

        for race in &meeting.races {
            match self.reconciler.ingest_fields(&meeting, race) {
                Ok(FieldOutcome::Replaced { report, .. }) => {
                    summary.races_upserted += 1;
                    let start = race_scraper::normalize_race_start(
                        meeting.date,
                        race.start_time_text.as_deref(),
                        self.reconciler.offset(),
                    );
                    self.events.record(&RaceUpsertedEvent {
                        ts: now_iso(),
                        event: "RACE_UPSERTED",
                        meeting_name: meeting.meeting_name.clone(),
                        race_number: race.race_number,
                        race_date: meeting.date.to_string(),
                        race_time: start.to_rfc3339(),
                        time_known: start.time_known,
                        active_runner_count: race.active_runner_count(),
                        scratched: race.scratched().count() as u32,
                        replaced: report.replaced,
                        runner_failures: report.runner_failures.len(),
                    });
                }
                Ok(FieldOutcome::SkippedResulted { .. }) => summary.races_skipped += 1,
                Err(e) => {
                    warn!("Upsert failed for {} R{}: {:#}", meeting.meeting_name, race.race_number, e);
                    summary.races_skipped += 1;
                }
            }
        }

        Some(meeting)
    }

    /// Výsledky pro neuzavřené dostihy v okně, jeden fetch na mítink (meeting_url)
    async fn results_for_window(
        &mut self,
        from: NaiveDate,
        to: NaiveDate,
        now: DateTime<FixedOffset>,
        summary: &mut RunSummaryEvent,
    ) -> Result<()> {
        let races = self
            .reconciler
            .store()
            .races_between(from, to)
            .with_context(|| format!("load races {from}..{to}"))?;

        let mut meetings: BTreeMap<String, String> = BTreeMap::new();
        for race in races.iter().filter(|r| r.status != RaceStatus::Resulted) {
            match race.meeting_url.as_deref() {
                Some(url) => {
                    meetings.entry(url.to_string()).or_insert_with(|| race.key.meeting_name.clone());
                }
                None => warn!("{} has no meeting URL, skipping results", race.key),
            }
        }

        info!("Results pass {}..{}: {} meetings to check", from, to, meetings.len());
        for (fields_url, meeting_name) in meetings {
            self.results_for_meeting(&meeting_name, &fields_url, now, summary).await;
        }
        Ok(())
    }

    async fn results_for_meeting(
        &mut self,
        meeting_name: &str,
        fields_url: &str,
        now: DateTime<FixedOffset>,
        summary: &mut RunSummaryEvent,
    ) {
        summary.meetings_seen += 1;
        let results_url = fields_to_results_url(fields_url);

        let Some(races) = self.source.meeting_results(&results_url, meeting_name).await else {
            self.skip_meeting(summary, meeting_name, &results_url, "results", "fetch failed");
            return;
        };
        if races.is_empty() {
            info!("No results published yet for {}", meeting_name);
            return;
        }

        for race in &races {
            self.apply_results(race, now, summary).await;
        }
    }

    async fn apply_results(&mut self, results: &RaceResults, now: DateTime<FixedOffset>, summary: &mut RunSummaryEvent) {
        let applied = match self.reconciler.ingest_results(results, now) {
            Ok(applied) => applied,
            Err(e) => {
                warn!("Results failed for {} R{}: {:#}", results.meeting_name, results.race_number, e);
                summary.races_skipped += 1;
                return;
            }
        };

        let outcome = match applied {
            ResultsApplied::Applied(outcome) => outcome,
            ResultsApplied::RaceNotFound => {
                summary.races_not_found += 1;
                return;
            }
            ResultsApplied::Unresolved {
                candidate_dates,
                best_confirmations,
            } => {
                summary.races_unresolved += 1;
                self.flag_ambiguous(results, &candidate_dates, None, best_confirmations).await;
                return;
            }
        };

        let all_prices_missing = results.all_prices_missing();
        if all_prices_missing {
            info!(
                "{} R{}: no starting prices published, results kept without stat",
                results.meeting_name, results.race_number
            );
        }

        summary.races_resulted += 1;
        self.events.record(&ResultsAppliedEvent {
            ts: now_iso(),
            event: "RESULTS_APPLIED",
            meeting_name: results.meeting_name.clone(),
            race_number: results.race_number,
            race_id: outcome.race.id,
            race_date: outcome.race.key.race_date.to_string(),
            match_kind: outcome.matched.kind(),
            matched: outcome.matched_runners,
            unmatched: outcome.unmatched.clone(),
            all_prices_missing,
            top_2_in_top_2: outcome.top_2_in_top_2,
        });

        if let RaceMatch::Fallback { best_confirmations, .. } = outcome.matched {
            summary.fallback_matches += 1;
            self.flag_ambiguous(results, &outcome.candidate_dates, Some(outcome.race.key.race_date), best_confirmations)
                .await;
        }
    }

    /// AMBIGUOUS_RACE_MATCH + ntfy; chosen = None → výsledky nezapsány
    async fn flag_ambiguous(
        &self,
        results: &RaceResults,
        candidate_dates: &[String],
        chosen: Option<NaiveDate>,
        confirmations: u32,
    ) {
        self.events.record(&AmbiguousRaceMatchEvent {
            ts: now_iso(),
            event: "AMBIGUOUS_RACE_MATCH",
            meeting_name: results.meeting_name.clone(),
            race_number: results.race_number,
            candidates: candidate_dates.to_vec(),
            chosen_date: chosen.map(|d| d.to_string()),
            confirmations,
        });

        let Some(url) = &self.ntfy_url else {
            return;
        };
        let outcome = match chosen {
            Some(date) => format!("results written to {date}"),
            None => "no candidate has started yet, results not written".to_string(),
        };
        let msg = format!(
            "{} R{}: no stored race confirmed by runner names, {} (candidates: {})",
            results.meeting_name,
            results.race_number,
            outcome,
            candidate_dates.join(", ")
        );
        send_ntfy_alert(url, &msg, "Ambiguous race match").await;
    }

    /// Výsledky pro neuzavřené dostihy v okně
    pub async fn backfill_results(&mut self, window: BackfillWindow, now: DateTime<Utc>) -> Result<RunSummaryEvent> {
        let mut summary = Self::summary("backfill-results");
        let offset = self.reconciler.offset();
        let (from, to) = window.bounds(local_today(now, offset))?;
        self.results_for_window(from, to, local_now(now, offset), &mut summary).await?;
        Ok(self.finish(summary))
    }

    /// Znovu fields pro dostihy bez aktivních běžců nebo bez vzdálenosti
    pub async fn backfill_fields(&mut self, window: BackfillWindow, now: DateTime<Utc>) -> Result<RunSummaryEvent> {
        let mut summary = Self::summary("backfill-fields");
        let (from, to) = window.bounds(local_today(now, self.reconciler.offset()))?;

        let races = self
            .reconciler
            .store()
            .races_between(from, to)
            .with_context(|| format!("load races {from}..{to}"))?;

        // (mítink, den) → fields URL; chybějící URL se rekonstruuje z názvu a data
        let mut meetings: BTreeMap<(String, NaiveDate), String> = BTreeMap::new();
        for race in races.iter().filter(|r| needs_fields(r)) {
            let url = race
                .meeting_url
                .clone()
                .unwrap_or_else(|| reconstruct_fields_url(&race.key.meeting_name, race.key.race_date));
            meetings
                .entry((race.key.meeting_name.clone(), race.key.race_date))
                .or_insert(url);
        }

        info!("Fields backfill {}..{}: {} meetings", from, to, meetings.len());
        for ((meeting_name, _), url) in meetings {
            self.ingest_meeting_fields(&meeting_name, &url, &mut summary).await;
        }

        Ok(self.finish(summary))
    }

    /// Archiv výsledků pro jeden den → skutečné URL mítinků → výsledky nedokončených mítinků
    pub async fn backfill_archive(&mut self, date: NaiveDate, now: DateTime<Utc>) -> Result<RunSummaryEvent> {
        let mut summary = Self::summary("backfill-archive");
        let archive_url = results_archive_url(date);

        let web_urls = match self.source.render(&archive_url, ARCHIVE_MARKER).await {
            Some(html) => discover_archive_meetings(&html),
            None => {
                self.skip_meeting(&mut summary, "results archive", &archive_url, "archive", "fetch failed");
                BTreeMap::new()
            }
        };

        let races = self
            .reconciler
            .store()
            .races_between(date, date)
            .with_context(|| format!("load races on {date}"))?;

        let mut by_meeting: BTreeMap<String, Vec<&RaceRecord>> = BTreeMap::new();
        for race in &races {
            by_meeting.entry(race.key.meeting_name.clone()).or_default().push(race);
        }

        let mut targets = Vec::new();
        for (meeting_name, meeting_races) in &by_meeting {
            let resulted = meeting_races.iter().filter(|r| r.status == RaceStatus::Resulted).count();
            if resulted == meeting_races.len() {
                info!("[{}] all {} races resulted, skipping", meeting_name, resulted);
                continue;
            }

            // Archiv má přednost, pak uložená URL se skutečným ID
            let stored = meeting_races
                .iter()
                .filter_map(|r| r.meeting_url.as_deref())
                .find(|u| has_real_meeting_id(u));
            match web_urls.get(meeting_name).map(String::as_str).or(stored) {
                Some(url) => targets.push((meeting_name.clone(), url.to_string())),
                None => {
                    let url = reconstruct_fields_url(meeting_name, date);
                    self.skip_meeting(&mut summary, meeting_name, &url, "archive", "no real meeting URL");
                }
            }
        }

        let local = local_now(now, self.reconciler.offset());
        for (meeting_name, url) in targets {
            self.results_for_meeting(&meeting_name, &url, local, &mut summary).await;
        }

        Ok(self.finish(summary))
    }

    /// Přepočet statistiky pro všechny resulted dostihy
    pub fn restat(&mut self) -> Result<RunSummaryEvent> {
        let mut summary = Self::summary("restat");
        let races = self
            .reconciler
            .store()
            .races_with_status(RaceStatus::Resulted)
            .context("load resulted races")?;
        let report = self.reconciler.recompute_stats(&races)?;
        info!("Restat: {} checked, {} rewritten", report.checked, report.rewritten);
        summary.stats_rewritten = report.rewritten;
        Ok(self.finish(summary))
    }
}

fn needs_fields(race: &RaceRecord) -> bool {
    race.status != RaceStatus::Resulted && (race.active_runner_count == 0 || race.distance_meters.is_none())
}

//! Entity reconciler
//!
//! A) fields → replace-by-identity (meeting, číslo dostihu, datum)
//! B) výsledky → najít správný uložený dostih, zapsat umístění a SP, spočítat top-2 statistiku
//!
//! Výsledková stránka datum neobsahuje, takže (meeting, číslo) může sedět na víc dnů.
//! Rozhoduje, u kterého kandidáta se najdou jména psů z výsledků. Bez potvrzení
//! připadá v úvahu jen dostih, který už odstartoval.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use race_scraper::{normalize_race_start, MeetingFields, RaceBlock, RaceResults};
use race_stats::{has_valid_prices, top_two_in_top_two, RunnerOutcome};
use race_store::{NewRace, NewRunner, RaceKey, RaceRecord, RaceStatus, RaceStore, ReplaceReport, RunnerRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPolicy {
    /// Kolik jmen z výsledků musí kandidát obsahovat, aby byl "potvrzený"
    pub min_confirmed_runners: u32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self { min_confirmed_runners: 1 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    Replaced {
        race_id: i64,
        status: RaceStatus,
        report: ReplaceReport,
    },
    /// Dostih už má výsledky – fields se znovu nezapisují
    SkippedResulted { race_id: i64 },
}

/// Jak byl vybrán dostih pro výsledky
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceMatch {
    Single { race_id: i64 },
    Confirmed { race_id: i64, confirmations: u32 },
    /// Nikdo nepotvrzen → nejnovější kandidát, hlásí se operátorovi
    Fallback { race_id: i64, candidates: usize, best_confirmations: u32 },
}

impl RaceMatch {
    pub fn race_id(&self) -> i64 {
        match self {
            RaceMatch::Single { race_id }
            | RaceMatch::Confirmed { race_id, .. }
            | RaceMatch::Fallback { race_id, .. } => *race_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RaceMatch::Single { .. } => "single",
            RaceMatch::Confirmed { .. } => "confirmed",
            RaceMatch::Fallback { .. } => "fallback",
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, RaceMatch::Fallback { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultOutcome {
    pub race: RaceRecord,
    pub matched: RaceMatch,
    /// Všichni kandidáti (nejnovější první) – pro diagnostiku fallbacku
    pub candidate_dates: Vec<String>,
    pub matched_runners: usize,
    /// "Dog Name (box)" řádky bez protějšku v uloženém dostihu
    pub unmatched: Vec<String>,
    pub write_failures: usize,
    pub top_2_in_top_2: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultsApplied {
    Applied(ResultOutcome),
    RaceNotFound,
    /// Nikdo nepotvrzen a žádný kandidát ještě neodstartoval – nic se nezapsalo
    Unresolved {
        candidate_dates: Vec<String>,
        best_confirmations: u32,
    },
}

/// Výběr kandidáta před zápisem
enum Choice {
    Matched(RaceMatch),
    Unresolved { best_confirmations: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestatReport {
    pub checked: usize,
    pub rewritten: usize,
}

pub struct Reconciler<S: RaceStore> {
    store: S,
    offset: FixedOffset,
    policy: MatchPolicy,
}

impl<S: RaceStore> Reconciler<S> {
    pub fn new(store: S, offset: FixedOffset, policy: MatchPolicy) -> Self {
        Self { store, offset, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Contract A: jeden dostih z fields stránky
    pub fn ingest_fields(&mut self, meeting: &MeetingFields, race: &RaceBlock) -> Result<FieldOutcome> {
        let start = normalize_race_start(meeting.date, race.start_time_text.as_deref(), self.offset);
        let key = RaceKey {
            meeting_name: meeting.meeting_name.clone(),
            race_number: race.race_number,
            race_date: meeting.date,
        };

        let existing = self
            .store
            .races_for_identity(&key)
            .with_context(|| format!("look up existing {key}"))?;

        if let Some(done) = existing.iter().find(|r| r.status == RaceStatus::Resulted) {
            debug!("{} already resulted, keeping stored fields", key);
            return Ok(FieldOutcome::SkippedResulted { race_id: done.id });
        }

        // closed se nevrací na upcoming
        let status = if existing.iter().any(|r| r.status == RaceStatus::Closed) {
            RaceStatus::Closed
        } else {
            RaceStatus::Upcoming
        };

        let new_race = NewRace {
            key: key.clone(),
            meeting_url: Some(meeting.meeting_url.clone()).filter(|u| !u.is_empty()),
            race_time: start.timestamp,
            time_known: start.time_known,
            distance_meters: race.distance_meters,
            status,
            active_runner_count: race.active_runner_count(),
        };
        let runners: Vec<NewRunner> = race
            .runners
            .iter()
            .map(|r| NewRunner {
                dog_name: r.dog_name.clone(),
                box_number: r.box_number,
                odds_primary: r.odds_primary,
                odds_secondary: r.odds_secondary,
                is_scratched: r.is_scratched,
                scratch_reason: r.scratch_reason.map(|s| s.as_str().to_string()),
            })
            .collect();

        let report = self
            .store
            .replace_race(&new_race, &runners)
            .with_context(|| format!("replace {key}"))?;

        info!(
            "Upserted {} at {} ({} active, {} stored)",
            key,
            start.to_rfc3339(),
            new_race.active_runner_count,
            report.runners_inserted
        );

        Ok(FieldOutcome::Replaced {
            race_id: report.race_id,
            status,
            report,
        })
    }

    /// Contract B: výsledky jednoho dostihu. `now` určuje, které dostihy už mohly běžet.
    pub fn ingest_results(&mut self, results: &RaceResults, now: DateTime<FixedOffset>) -> Result<ResultsApplied> {
        let now = now.with_timezone(&self.offset);
        let candidates = self
            .store
            .races_by_number(&results.meeting_name, results.race_number)
            .with_context(|| format!("load candidates for {} R{}", results.meeting_name, results.race_number))?;

        if candidates.is_empty() {
            warn!("Race not found: {} R{}", results.meeting_name, results.race_number);
            return Ok(ResultsApplied::RaceNotFound);
        }

        let candidate_dates: Vec<String> = candidates.iter().map(|r| r.key.race_date.to_string()).collect();
        let matched = match self.choose_candidate(&candidates, results, now)? {
            Choice::Matched(matched) => matched,
            Choice::Unresolved { best_confirmations } => {
                warn!(
                    "No candidate confirmed for {} R{} among {:?} and none has started yet, results not written",
                    results.meeting_name, results.race_number, candidate_dates
                );
                return Ok(ResultsApplied::Unresolved {
                    candidate_dates,
                    best_confirmations,
                });
            }
        };
        let Some(race) = candidates.iter().find(|r| r.id == matched.race_id()).cloned() else {
            return Ok(ResultsApplied::RaceNotFound);
        };

        if matched.is_fallback() {
            warn!(
                "No candidate confirmed for {} R{} among {:?}, falling back to started race {}",
                results.meeting_name, results.race_number, candidate_dates, race.key.race_date
            );
        }

        let mut matched_runners = 0;
        let mut unmatched = Vec::new();
        let mut write_failures = 0;

        for row in &results.rows {
            match self.store.find_runner(race.id, &row.dog_name, row.box_number) {
                Ok(Some(runner)) => {
                    match self.store.record_outcome(runner.id, row.finishing_position, row.starting_price) {
                        Ok(()) => matched_runners += 1,
                        Err(e) => {
                            warn!("Outcome write failed for {} (box {}): {:#}", row.dog_name, row.box_number, e);
                            write_failures += 1;
                        }
                    }
                }
                Ok(None) => {
                    debug!("Runner not found: {} (box {}) in {}", row.dog_name, row.box_number, race.key);
                    unmatched.push(format!("{} ({})", row.dog_name, row.box_number));
                }
                Err(e) => {
                    warn!("Runner lookup failed for {} (box {}): {:#}", row.dog_name, row.box_number, e);
                    write_failures += 1;
                }
            }
        }

        // Statistika z toho, co je opravdu uložené
        let top_2_in_top_2 = match self.store.runners(race.id) {
            Ok(runners) => {
                let stored = outcomes(&runners);
                if !has_valid_prices(&stored) {
                    info!("{} has no valid starting price, stat not evaluable", race.key);
                }
                top_two_in_top_two(&stored)
            }
            Err(e) => {
                warn!("Could not re-read runners of {}: {:#}", race.key, e);
                None
            }
        };

        self.store
            .mark_resulted(race.id, top_2_in_top_2)
            .with_context(|| format!("mark {} resulted", race.key))?;

        info!(
            "Results for {}: {} matched, {} unmatched, top2={}",
            race.key,
            matched_runners,
            unmatched.len(),
            top_2_in_top_2.map_or("null".to_string(), |v| v.to_string())
        );

        Ok(ResultsApplied::Applied(ResultOutcome {
            race,
            matched,
            candidate_dates,
            matched_runners,
            unmatched,
            write_failures,
            top_2_in_top_2,
        }))
    }

    /// Kandidát s nejvíc potvrzenými jmény; remíza → novější (kandidáti jdou od nejnovějšího).
    /// Bez potvrzení nejnovější odstartovaný kandidát, jinak Unresolved.
    fn choose_candidate(
        &self,
        candidates: &[RaceRecord],
        results: &RaceResults,
        now: DateTime<FixedOffset>,
    ) -> Result<Choice> {
        if let [only] = candidates {
            if has_started(only, now) {
                return Ok(Choice::Matched(RaceMatch::Single { race_id: only.id }));
            }
        }

        let names: BTreeSet<String> = results
            .rows
            .iter()
            .map(|r| r.dog_name.trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();

        let mut best: Option<(&RaceRecord, u32)> = None;
        for candidate in candidates {
            let mut confirmations = 0u32;
            for name in &names {
                if self.store.count_runners_named(candidate.id, name)? > 0 {
                    confirmations += 1;
                }
            }
            debug!("Candidate {} has {} confirmed names", candidate.key, confirmations);
            if best.map_or(true, |(_, c)| confirmations > c) {
                best = Some((candidate, confirmations));
            }
        }

        let threshold = self.policy.min_confirmed_runners.max(1);
        if let Some((race, confirmations)) = best.filter(|(_, c)| *c >= threshold) {
            return Ok(Choice::Matched(RaceMatch::Confirmed {
                race_id: race.id,
                confirmations,
            }));
        }

        let best_confirmations = best.map_or(0, |(_, c)| c);
        Ok(match candidates.iter().find(|r| has_started(r, now)) {
            Some(race) => Choice::Matched(RaceMatch::Fallback {
                race_id: race.id,
                candidates: candidates.len(),
                best_confirmations,
            }),
            None => Choice::Unresolved { best_confirmations },
        })
    }

    /// upcoming → closed pro odstartované dostihy ("now" převedený do kanonického offsetu)
    pub fn close_started(&mut self, now: DateTime<FixedOffset>) -> Result<usize> {
        let now = now.with_timezone(&self.offset);
        let closed = self.store.close_started(now).context("close pass")?;
        if closed > 0 {
            info!("Closed {} started races", closed);
        }
        Ok(closed)
    }

    /// Přepočet top_2_in_top_2 z uložených běžců; přepisuje jen nesouhlasné hodnoty
    pub fn recompute_stats(&mut self, races: &[RaceRecord]) -> Result<RestatReport> {
        let mut report = RestatReport::default();

        for race in races.iter().filter(|r| r.status == RaceStatus::Resulted) {
            report.checked += 1;
            let runners = self
                .store
                .runners(race.id)
                .with_context(|| format!("read runners of {}", race.key))?;
            let fresh = top_two_in_top_two(&outcomes(&runners));
            if fresh != race.top_2_in_top_2 {
                info!("Restat {}: {:?} → {:?}", race.key, race.top_2_in_top_2, fresh);
                self.store
                    .set_top_2(race.id, fresh)
                    .with_context(|| format!("rewrite stat of {}", race.key))?;
                report.rewritten += 1;
            }
        }

        Ok(report)
    }
}

/// Upcoming dostih odstartoval, když minul jeho čas; bez známého času stačí, že začal jeho den
fn has_started(race: &RaceRecord, now: DateTime<FixedOffset>) -> bool {
    match race.status {
        RaceStatus::Closed | RaceStatus::Resulted => true,
        RaceStatus::Upcoming if race.time_known => race.race_time <= now,
        RaceStatus::Upcoming => race.key.race_date <= now.date_naive(),
    }
}

pub fn outcomes(runners: &[RunnerRecord]) -> Vec<RunnerOutcome> {
    runners
        .iter()
        .map(|r| RunnerOutcome {
            box_number: r.box_number,
            starting_price: r.starting_price,
            finishing_position: r.finishing_position,
        })
        .collect()
}

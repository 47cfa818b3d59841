//! Úložiště dostihů a běžců
//!
//! Identita dostihu = (meeting_name, race_number, race_date). `race_date` je místní
//! kalendářní den v kanonickém offsetu – všechny dotazy podle data jdou přes něj,
//! nikdy přes porovnání timestampů s různými offsety.

mod sqlite;

pub use sqlite::{SqliteStore, StoreSummary};

use anyhow::{bail, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaceStatus {
    Upcoming,
    /// Start proběhl, výsledky zatím nejsou
    Closed,
    Resulted,
}

impl RaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RaceStatus::Upcoming => "upcoming",
            RaceStatus::Closed => "closed",
            RaceStatus::Resulted => "resulted",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "upcoming" => Ok(RaceStatus::Upcoming),
            "closed" => Ok(RaceStatus::Closed),
            "resulted" => Ok(RaceStatus::Resulted),
            other => bail!("Unknown race status '{}'", other),
        }
    }
}

impl fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RaceKey {
    pub meeting_name: String,
    pub race_number: u32,
    pub race_date: NaiveDate,
}

impl fmt::Display for RaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} R{} ({})", self.meeting_name, self.race_number, self.race_date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRace {
    pub key: RaceKey,
    pub meeting_url: Option<String>,
    pub race_time: DateTime<FixedOffset>,
    pub time_known: bool,
    pub distance_meters: Option<u32>,
    pub status: RaceStatus,
    pub active_runner_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRunner {
    pub dog_name: String,
    pub box_number: u32,
    pub odds_primary: Option<f64>,
    pub odds_secondary: Option<f64>,
    pub is_scratched: bool,
    pub scratch_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceRecord {
    pub id: i64,
    pub key: RaceKey,
    pub meeting_url: Option<String>,
    pub race_time: DateTime<FixedOffset>,
    pub time_known: bool,
    pub distance_meters: Option<u32>,
    pub status: RaceStatus,
    pub active_runner_count: u32,
    pub top_2_in_top_2: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerRecord {
    pub id: i64,
    pub race_id: i64,
    pub dog_name: String,
    pub box_number: u32,
    pub odds_primary: Option<f64>,
    pub odds_secondary: Option<f64>,
    pub is_scratched: bool,
    pub scratch_reason: Option<String>,
    pub finishing_position: Option<u32>,
    pub starting_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunnerFailure {
    pub dog_name: String,
    pub box_number: u32,
    pub error: String,
}

/// Co udělal replace-by-identity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaceReport {
    pub race_id: i64,
    /// Počet smazaných starších řádků se stejnou identitou
    pub replaced: usize,
    pub runners_inserted: usize,
    pub runner_failures: Vec<RunnerFailure>,
}

pub trait RaceStore {
    fn races_for_identity(&self, key: &RaceKey) -> Result<Vec<RaceRecord>>;
    /// Smaže dostih i jeho běžce
    fn delete_race(&mut self, race_id: i64) -> Result<()>;
    fn insert_race(&mut self, race: &NewRace) -> Result<i64>;
    fn insert_runner(&mut self, race_id: i64, runner: &NewRunner) -> Result<i64>;

    /// Delete-then-insert pro jednu identitu. Selhání jednoho běžce neruší ostatní.
    ///
    /// Výchozí implementace není atomická: mezi smazáním a vložením je identita
    /// krátce prázdná. Úložiště s transakcemi ji mají přepsat.
    fn replace_race(&mut self, race: &NewRace, runners: &[NewRunner]) -> Result<ReplaceReport> {
        let existing = self.races_for_identity(&race.key)?;
        for old in &existing {
            self.delete_race(old.id)?;
        }

        let race_id = self.insert_race(race)?;
        let mut report = ReplaceReport {
            race_id,
            replaced: existing.len(),
            runners_inserted: 0,
            runner_failures: Vec::new(),
        };

        for runner in runners {
            match self.insert_runner(race_id, runner) {
                Ok(_) => report.runners_inserted += 1,
                Err(e) => {
                    warn!("Runner insert failed for {} box {} ({}): {:#}", race.key, runner.box_number, runner.dog_name, e);
                    report.runner_failures.push(RunnerFailure {
                        dog_name: runner.dog_name.clone(),
                        box_number: runner.box_number,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Všechny dostihy daného mítinku a čísla, nejnovější datum první
    fn races_by_number(&self, meeting_name: &str, race_number: u32) -> Result<Vec<RaceRecord>>;
    fn race(&self, race_id: i64) -> Result<Option<RaceRecord>>;
    fn runners(&self, race_id: i64) -> Result<Vec<RunnerRecord>>;

    /// Kolik běžců dostihu nese toto jméno (bez ohledu na velikost písmen)
    fn count_runners_named(&self, race_id: i64, dog_name: &str) -> Result<u32>;
    /// Jméno (case-insensitive) A box musí sedět zároveň
    fn find_runner(&self, race_id: i64, dog_name: &str, box_number: u32) -> Result<Option<RunnerRecord>>;

    fn record_outcome(&mut self, runner_id: i64, finishing_position: u32, starting_price: Option<f64>) -> Result<()>;
    fn mark_resulted(&mut self, race_id: i64, top_2_in_top_2: Option<bool>) -> Result<()>;
    fn set_top_2(&mut self, race_id: i64, top_2_in_top_2: Option<bool>) -> Result<()>;

    /// Dostihy s race_date v [from, to] včetně
    fn races_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<RaceRecord>>;
    fn races_with_status(&self, status: RaceStatus) -> Result<Vec<RaceRecord>>;

    /// upcoming → closed pro dostihy, které už odstartovaly.
    /// Dostih bez známého času se zavírá až po skončení svého dne.
    fn close_started(&mut self, now: DateTime<FixedOffset>) -> Result<usize>;
}

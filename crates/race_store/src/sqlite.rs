use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::{
    NewRace, NewRunner, RaceKey, RaceRecord, RaceStatus, RaceStore, ReplaceReport, RunnerFailure, RunnerRecord,
};

const RACE_COLUMNS: &str = "id, meeting_name, race_number, race_date, race_time, time_known, meeting_url, \
                            distance_meters, status, active_runner_count, top_2_in_top_2";
const RUNNER_COLUMNS: &str = "id, race_id, dog_name, box_number, odds_primary, odds_secondary, is_scratched, \
                              scratch_reason, finishing_position, starting_price";

pub struct SqliteStore {
    conn: Connection,
}

/// Souhrn pro race-db-stats
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSummary {
    pub races: i64,
    pub runners: i64,
    pub upcoming: i64,
    pub closed: i64,
    pub resulted: i64,
    pub missing_distance: i64,
    pub missing_meeting_url: i64,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    /// (active_runner_count, top_2_in_top_2) pro všechny resulted dostihy
    pub resulted_flags: Vec<(u32, Option<bool>)>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db_path = path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db at {}", db_path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        let store = Self::configure(conn)?;
        info!("Race store ready at {}", db_path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON").context("enable foreign keys")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn summary(&self) -> Result<StoreSummary> {
        let count = |sql: &str| -> Result<i64> {
            self.conn
                .query_row(sql, [], |r| r.get(0))
                .with_context(|| format!("summary query: {sql}"))
        };

        let (first_date, last_date): (Option<String>, Option<String>) = self
            .conn
            .query_row("SELECT MIN(race_date), MAX(race_date) FROM races", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .context("read date range")?;

        let mut stmt = self
            .conn
            .prepare("SELECT active_runner_count, top_2_in_top_2 FROM races WHERE status = 'resulted'")
            .context("prepare resulted flags")?;
        let resulted_flags = stmt
            .query_map([], |r| Ok((r.get::<_, u32>(0)?, r.get::<_, Option<bool>>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("read resulted flags")?;

        Ok(StoreSummary {
            races: count("SELECT COUNT(1) FROM races")?,
            runners: count("SELECT COUNT(1) FROM runners")?,
            upcoming: count("SELECT COUNT(1) FROM races WHERE status = 'upcoming'")?,
            closed: count("SELECT COUNT(1) FROM races WHERE status = 'closed'")?,
            resulted: count("SELECT COUNT(1) FROM races WHERE status = 'resulted'")?,
            missing_distance: count("SELECT COUNT(1) FROM races WHERE distance_meters IS NULL")?,
            missing_meeting_url: count("SELECT COUNT(1) FROM races WHERE meeting_url IS NULL OR meeting_url = ''")?,
            first_date,
            last_date,
            resulted_flags,
        })
    }

    fn query_races(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<RaceRecord>> {
        let mut stmt = self.conn.prepare(sql).context("prepare race query")?;
        let races = stmt
            .query_map(params, race_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("read races")?;
        Ok(races)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS races (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_name TEXT NOT NULL,
            race_number INTEGER NOT NULL CHECK (race_number > 0),
            race_date TEXT NOT NULL,
            race_time TEXT NOT NULL,
            starts_at_utc INTEGER NOT NULL,
            time_known INTEGER NOT NULL,
            meeting_url TEXT,
            distance_meters INTEGER,
            status TEXT NOT NULL DEFAULT 'upcoming',
            active_runner_count INTEGER NOT NULL DEFAULT 0,
            top_2_in_top_2 INTEGER,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_races_identity ON races(meeting_name, race_number, race_date);
        CREATE INDEX IF NOT EXISTS idx_races_date ON races(race_date);
        CREATE INDEX IF NOT EXISTS idx_races_status ON races(status);

        CREATE TABLE IF NOT EXISTS runners (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            race_id INTEGER NOT NULL REFERENCES races(id) ON DELETE CASCADE,
            dog_name TEXT NOT NULL CHECK (length(trim(dog_name)) > 0),
            box_number INTEGER NOT NULL CHECK (box_number > 0),
            odds_primary REAL,
            odds_secondary REAL,
            is_scratched INTEGER NOT NULL DEFAULT 0,
            scratch_reason TEXT,
            finishing_position INTEGER,
            starting_price REAL
        );

        CREATE INDEX IF NOT EXISTS idx_runners_race ON runners(race_id);
        "#,
    )
    .context("init schema")?;

    Ok(())
}

fn conversion_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn race_from_row(row: &Row<'_>) -> rusqlite::Result<RaceRecord> {
    let race_date: String = row.get(3)?;
    let race_time: String = row.get(4)?;
    let status: String = row.get(8)?;

    Ok(RaceRecord {
        id: row.get(0)?,
        key: RaceKey {
            meeting_name: row.get(1)?,
            race_number: row.get(2)?,
            race_date: NaiveDate::parse_from_str(&race_date, "%Y-%m-%d").map_err(|e| conversion_error(3, e))?,
        },
        race_time: DateTime::parse_from_rfc3339(&race_time).map_err(|e| conversion_error(4, e))?,
        time_known: row.get(5)?,
        meeting_url: row.get(6)?,
        distance_meters: row.get(7)?,
        status: RaceStatus::parse(&status).map_err(|e| conversion_error(8, std::io::Error::other(e.to_string())))?,
        active_runner_count: row.get(9)?,
        top_2_in_top_2: row.get(10)?,
    })
}

fn runner_from_row(row: &Row<'_>) -> rusqlite::Result<RunnerRecord> {
    Ok(RunnerRecord {
        id: row.get(0)?,
        race_id: row.get(1)?,
        dog_name: row.get(2)?,
        box_number: row.get(3)?,
        odds_primary: row.get(4)?,
        odds_secondary: row.get(5)?,
        is_scratched: row.get(6)?,
        scratch_reason: row.get(7)?,
        finishing_position: row.get(8)?,
        starting_price: row.get(9)?,
    })
}

fn insert_race_row(conn: &Connection, race: &NewRace) -> Result<i64> {
    conn.execute(
        "INSERT INTO races(meeting_name, race_number, race_date, race_time, starts_at_utc, time_known, meeting_url, \
         distance_meters, status, active_runner_count, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            race.key.meeting_name,
            race.key.race_number,
            race.key.race_date.format("%Y-%m-%d").to_string(),
            race.race_time.to_rfc3339(),
            race.race_time.timestamp(),
            race.time_known,
            race.meeting_url,
            race.distance_meters,
            race.status.as_str(),
            race.active_runner_count,
            Utc::now().to_rfc3339(),
        ],
    )
    .with_context(|| format!("insert race {}", race.key))?;
    Ok(conn.last_insert_rowid())
}

fn insert_runner_row(conn: &Connection, race_id: i64, runner: &NewRunner) -> Result<i64> {
    conn.execute(
        "INSERT INTO runners(race_id, dog_name, box_number, odds_primary, odds_secondary, is_scratched, scratch_reason) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            race_id,
            runner.dog_name,
            runner.box_number,
            runner.odds_primary,
            runner.odds_secondary,
            runner.is_scratched,
            runner.scratch_reason,
        ],
    )
    .with_context(|| format!("insert runner {} (box {})", runner.dog_name, runner.box_number))?;
    Ok(conn.last_insert_rowid())
}

impl RaceStore for SqliteStore {
    fn races_for_identity(&self, key: &RaceKey) -> Result<Vec<RaceRecord>> {
        self.query_races(
            &format!(
                "SELECT {RACE_COLUMNS} FROM races WHERE meeting_name = ?1 AND race_number = ?2 AND race_date = ?3 ORDER BY id"
            ),
            params![key.meeting_name, key.race_number, key.race_date.format("%Y-%m-%d").to_string()],
        )
    }

    fn delete_race(&mut self, race_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM races WHERE id = ?1", params![race_id])
            .with_context(|| format!("delete race {race_id}"))?;
        Ok(())
    }

    fn insert_race(&mut self, race: &NewRace) -> Result<i64> {
        insert_race_row(&self.conn, race)
    }

    fn insert_runner(&mut self, race_id: i64, runner: &NewRunner) -> Result<i64> {
        insert_runner_row(&self.conn, race_id, runner)
    }

    /// Jedna transakce: čtenáři nikdy nevidí identitu bez řádku nebo se dvěma řádky
    fn replace_race(&mut self, race: &NewRace, runners: &[NewRunner]) -> Result<ReplaceReport> {
        let tx = self.conn.transaction().context("begin replace transaction")?;

        let replaced = tx
            .execute(
                "DELETE FROM races WHERE meeting_name = ?1 AND race_number = ?2 AND race_date = ?3",
                params![
                    race.key.meeting_name,
                    race.key.race_number,
                    race.key.race_date.format("%Y-%m-%d").to_string()
                ],
            )
            .with_context(|| format!("delete previous {}", race.key))?;

        let race_id = insert_race_row(&tx, race)?;
        let mut report = ReplaceReport {
            race_id,
            replaced,
            runners_inserted: 0,
            runner_failures: Vec::new(),
        };

        for runner in runners {
            match insert_runner_row(&tx, race_id, runner) {
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

        tx.commit().with_context(|| format!("commit replace of {}", race.key))?;
        debug!("Replaced {} ({} old rows, {} runners)", race.key, replaced, report.runners_inserted);
        Ok(report)
    }

    fn races_by_number(&self, meeting_name: &str, race_number: u32) -> Result<Vec<RaceRecord>> {
        self.query_races(
            &format!(
                "SELECT {RACE_COLUMNS} FROM races WHERE meeting_name = ?1 AND race_number = ?2 \
                 ORDER BY race_date DESC, starts_at_utc DESC, id DESC"
            ),
            params![meeting_name, race_number],
        )
    }

    fn race(&self, race_id: i64) -> Result<Option<RaceRecord>> {
        self.conn
            .query_row(&format!("SELECT {RACE_COLUMNS} FROM races WHERE id = ?1"), params![race_id], race_from_row)
            .optional()
            .with_context(|| format!("read race {race_id}"))
    }

    fn runners(&self, race_id: i64) -> Result<Vec<RunnerRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {RUNNER_COLUMNS} FROM runners WHERE race_id = ?1 ORDER BY box_number, id"))
            .context("prepare runners query")?;
        let runners = stmt
            .query_map(params![race_id], runner_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("read runners of race {race_id}"))?;
        Ok(runners)
    }

    fn count_runners_named(&self, race_id: i64, dog_name: &str) -> Result<u32> {
        self.conn
            .query_row(
                "SELECT COUNT(1) FROM runners WHERE race_id = ?1 AND trim(dog_name) = trim(?2) COLLATE NOCASE",
                params![race_id, dog_name],
                |r| r.get(0),
            )
            .with_context(|| format!("count runners named {dog_name}"))
    }

    fn find_runner(&self, race_id: i64, dog_name: &str, box_number: u32) -> Result<Option<RunnerRecord>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {RUNNER_COLUMNS} FROM runners \
                     WHERE race_id = ?1 AND trim(dog_name) = trim(?2) COLLATE NOCASE AND box_number = ?3 \
                     ORDER BY id LIMIT 1"
                ),
                params![race_id, dog_name, box_number],
                runner_from_row,
            )
            .optional()
            .with_context(|| format!("find runner {dog_name} box {box_number}"))
    }

    fn record_outcome(&mut self, runner_id: i64, finishing_position: u32, starting_price: Option<f64>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE runners SET finishing_position = ?2, starting_price = ?3 WHERE id = ?1",
                params![runner_id, finishing_position, starting_price],
            )
            .with_context(|| format!("record outcome for runner {runner_id}"))?;
        Ok(())
    }

    fn mark_resulted(&mut self, race_id: i64, top_2_in_top_2: Option<bool>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE races SET status = 'resulted', top_2_in_top_2 = ?2, updated_at = ?3 WHERE id = ?1",
                params![race_id, top_2_in_top_2, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("mark race {race_id} resulted"))?;
        Ok(())
    }

    fn set_top_2(&mut self, race_id: i64, top_2_in_top_2: Option<bool>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE races SET top_2_in_top_2 = ?2, updated_at = ?3 WHERE id = ?1",
                params![race_id, top_2_in_top_2, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("update top_2_in_top_2 of race {race_id}"))?;
        Ok(())
    }

    fn races_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<RaceRecord>> {
        self.query_races(
            &format!(
                "SELECT {RACE_COLUMNS} FROM races WHERE race_date >= ?1 AND race_date <= ?2 \
                 ORDER BY race_date, meeting_name, race_number"
            ),
            params![from.format("%Y-%m-%d").to_string(), to.format("%Y-%m-%d").to_string()],
        )
    }

    fn races_with_status(&self, status: RaceStatus) -> Result<Vec<RaceRecord>> {
        self.query_races(
            &format!("SELECT {RACE_COLUMNS} FROM races WHERE status = ?1 ORDER BY race_date, meeting_name, race_number"),
            params![status.as_str()],
        )
    }

    fn close_started(&mut self, now: DateTime<FixedOffset>) -> Result<usize> {
        let today = now.date_naive().format("%Y-%m-%d").to_string();
        let closed = self
            .conn
            .execute(
                "UPDATE races SET status = 'closed', updated_at = ?3 \
                 WHERE status = 'upcoming' \
                   AND ((time_known = 1 AND starts_at_utc < ?1) OR (time_known = 0 AND race_date < ?2))",
                params![now.timestamp(), today, Utc::now().to_rfc3339()],
            )
            .context("close started races")?;
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn aedt() -> FixedOffset {
        FixedOffset::east_opt(11 * 3600).unwrap()
    }

    fn new_race(meeting: &str, number: u32, day: u32, hour: u32) -> NewRace {
        NewRace {
            key: RaceKey {
                meeting_name: meeting.to_string(),
                race_number: number,
                race_date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            },
            meeting_url: Some(format!("https://x/form-guides/{}/fields/25{day:04}/", meeting.to_lowercase())),
            race_time: aedt().with_ymd_and_hms(2026, 1, day, hour, 0, 0).unwrap(),
            time_known: true,
            distance_meters: Some(515),
            status: RaceStatus::Upcoming,
            active_runner_count: 2,
        }
    }

    fn runner(box_number: u32, name: &str) -> NewRunner {
        NewRunner {
            dog_name: name.to_string(),
            box_number,
            odds_primary: Some(3.5),
            odds_secondary: None,
            is_scratched: false,
            scratch_reason: None,
        }
    }

    #[test]
    fn replace_keeps_single_row_per_identity() -> Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        let race = new_race("Angle Park", 3, 22, 20);

        let first = store.replace_race(&race, &[runner(1, "Fast Dog"), runner(2, "Slow Dog")])?;
        assert_eq!(first.replaced, 0);
        let second = store.replace_race(&race, &[runner(1, "Fast Dog"), runner(2, "Slow Dog")])?;
        assert_eq!(second.replaced, 1);
        assert_ne!(first.race_id, second.race_id);

        assert_eq!(store.races_for_identity(&race.key)?.len(), 1);
        // Kaskáda smazala běžce staré verze
        assert!(store.runners(first.race_id)?.is_empty());
        assert_eq!(store.runners(second.race_id)?.len(), 2);
        Ok(())
    }

    #[test]
    fn failed_runner_does_not_abort_race() -> Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        let race = new_race("Sale", 1, 22, 19);

        let report = store.replace_race(&race, &[runner(1, "Fast Dog"), runner(2, "   "), runner(3, "Late Dog")])?;
        assert_eq!(report.runners_inserted, 2);
        assert_eq!(report.runner_failures.len(), 1);
        assert_eq!(report.runner_failures[0].box_number, 2);

        let stored = store.race(report.race_id)?.unwrap();
        assert_eq!(stored.key, race.key);
        assert_eq!(stored.race_time.to_rfc3339(), "2026-01-22T19:00:00+11:00");
        Ok(())
    }

    #[test]
    fn candidates_are_most_recent_first() -> Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        store.replace_race(&new_race("Angle Park", 3, 21, 20), &[runner(1, "Fast Dog")])?;
        store.replace_race(&new_race("Angle Park", 3, 22, 20), &[runner(1, "Other Dog")])?;
        store.replace_race(&new_race("Angle Park", 4, 22, 21), &[])?;

        let candidates = store.races_by_number("Angle Park", 3)?;
        let dates: Vec<u32> = candidates.iter().map(|r| chrono::Datelike::day(&r.key.race_date)).collect();
        assert_eq!(dates, [22, 21]);
        Ok(())
    }

    #[test]
    fn runner_lookup_is_case_insensitive_and_box_bound() -> Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        let report = store.replace_race(&new_race("Sale", 2, 22, 19), &[runner(1, "Fast Dog"), runner(4, "Slow Dog")])?;

        assert_eq!(store.count_runners_named(report.race_id, "FAST DOG")?, 1);
        assert_eq!(store.count_runners_named(report.race_id, " fast dog ")?, 1);
        assert!(store.find_runner(report.race_id, "slow dog", 4)?.is_some());
        assert!(store.find_runner(report.race_id, "slow dog", 3)?.is_none());
        Ok(())
    }

    #[test]
    fn outcomes_and_tristate_stat() -> Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        let report = store.replace_race(&new_race("Sale", 2, 22, 19), &[runner(1, "Fast Dog")])?;
        let fast = store.find_runner(report.race_id, "Fast Dog", 1)?.unwrap();

        store.record_outcome(fast.id, 1, Some(2.4))?;
        store.mark_resulted(report.race_id, None)?;
        let race = store.race(report.race_id)?.unwrap();
        assert_eq!(race.status, RaceStatus::Resulted);
        assert_eq!(race.top_2_in_top_2, None);

        store.set_top_2(report.race_id, Some(false))?;
        assert_eq!(store.race(report.race_id)?.unwrap().top_2_in_top_2, Some(false));

        let runners = store.runners(report.race_id)?;
        assert_eq!(runners[0].finishing_position, Some(1));
        assert_eq!(runners[0].starting_price, Some(2.4));
        Ok(())
    }

    #[test]
    fn close_pass_respects_unknown_times() -> Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        store.replace_race(&new_race("Sale", 1, 22, 19), &[])?;
        store.replace_race(&new_race("Sale", 2, 22, 21), &[])?;
        let mut untimed = new_race("Sale", 3, 22, 0);
        untimed.time_known = false;
        store.replace_race(&untimed, &[])?;

        let now = aedt().with_ymd_and_hms(2026, 1, 22, 20, 0, 0).unwrap();
        assert_eq!(store.close_started(now)?, 1);
        assert_eq!(store.races_with_status(RaceStatus::Closed)?[0].key.race_number, 1);

        let next_day = aedt().with_ymd_and_hms(2026, 1, 23, 9, 0, 0).unwrap();
        assert_eq!(store.close_started(next_day)?, 2);
        assert!(store.races_with_status(RaceStatus::Upcoming)?.is_empty());
        Ok(())
    }

    #[test]
    fn date_window_is_inclusive() -> Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        for day in [20, 21, 22, 23] {
            store.replace_race(&new_race("Sale", 1, day, 19), &[])?;
        }
        let window = store.races_between(
            NaiveDate::from_ymd_opt(2026, 1, 21).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 22).unwrap(),
        )?;
        assert_eq!(window.len(), 2);
        Ok(())
    }

    #[test]
    fn file_store_persists_across_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("races.db");
        {
            let mut store = SqliteStore::open(&path)?;
            store.replace_race(&new_race("Sale", 1, 22, 19), &[runner(1, "Fast Dog")])?;
        }
        let store = SqliteStore::open(&path)?;
        let summary = store.summary()?;
        assert_eq!(summary.races, 1);
        assert_eq!(summary.runners, 1);
        assert_eq!(summary.upcoming, 1);
        assert_eq!(summary.first_date.as_deref(), Some("2026-01-22"));
        Ok(())
    }

    /// Úložiště bez vlastní transakce – používá výchozí replace_race
    struct PlainStore(SqliteStore);

    impl RaceStore for PlainStore {
        fn races_for_identity(&self, key: &RaceKey) -> Result<Vec<RaceRecord>> {
            self.0.races_for_identity(key)
        }
        fn delete_race(&mut self, race_id: i64) -> Result<()> {
            self.0.delete_race(race_id)
        }
        fn insert_race(&mut self, race: &NewRace) -> Result<i64> {
            self.0.insert_race(race)
        }
        fn insert_runner(&mut self, race_id: i64, runner: &NewRunner) -> Result<i64> {
            self.0.insert_runner(race_id, runner)
        }
        fn races_by_number(&self, meeting_name: &str, race_number: u32) -> Result<Vec<RaceRecord>> {
            self.0.races_by_number(meeting_name, race_number)
        }
        fn race(&self, race_id: i64) -> Result<Option<RaceRecord>> {
            self.0.race(race_id)
        }
        fn runners(&self, race_id: i64) -> Result<Vec<RunnerRecord>> {
            self.0.runners(race_id)
        }
        fn count_runners_named(&self, race_id: i64, dog_name: &str) -> Result<u32> {
            self.0.count_runners_named(race_id, dog_name)
        }
        fn find_runner(&self, race_id: i64, dog_name: &str, box_number: u32) -> Result<Option<RunnerRecord>> {
            self.0.find_runner(race_id, dog_name, box_number)
        }
        fn record_outcome(&mut self, runner_id: i64, position: u32, sp: Option<f64>) -> Result<()> {
            self.0.record_outcome(runner_id, position, sp)
        }
        fn mark_resulted(&mut self, race_id: i64, top_2_in_top_2: Option<bool>) -> Result<()> {
            self.0.mark_resulted(race_id, top_2_in_top_2)
        }
        fn set_top_2(&mut self, race_id: i64, top_2_in_top_2: Option<bool>) -> Result<()> {
            self.0.set_top_2(race_id, top_2_in_top_2)
        }
        fn races_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<RaceRecord>> {
            self.0.races_between(from, to)
        }
        fn races_with_status(&self, status: RaceStatus) -> Result<Vec<RaceRecord>> {
            self.0.races_with_status(status)
        }
        fn close_started(&mut self, now: DateTime<FixedOffset>) -> Result<usize> {
            self.0.close_started(now)
        }
    }

    #[test]
    fn default_replace_matches_transactional_one() -> Result<()> {
        let mut store = PlainStore(SqliteStore::open_in_memory()?);
        let race = new_race("Angle Park", 3, 22, 20);

        store.replace_race(&race, &[runner(1, "Fast Dog")])?;
        let report = store.replace_race(&race, &[runner(1, "Fast Dog"), runner(2, ""), runner(3, "Slow Dog")])?;
        assert_eq!(report.replaced, 1);
        assert_eq!(report.runners_inserted, 2);
        assert_eq!(report.runner_failures.len(), 1);
        assert_eq!(store.races_for_identity(&race.key)?.len(), 1);
        Ok(())
    }
}

//! Normalizace času startu
//!
//! Web ukazuje místní čas dráhy ("8:45PM"), datum bere z titulku mítinku.
//! Všechno se ukládá s jedním pevným offsetem (výchozí +11:00, AEDT) – stejný offset
//! musí použít i dotazy podle data, jinak rozsahové dotazy tiše minou řádky.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2}):(\d{2})\s?([AP]M)\b").unwrap());

/// Start dostihu v kanonickém offsetu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceStart {
    pub timestamp: DateTime<FixedOffset>,
    /// false = čas v hlavičce chyběl, timestamp je půlnoc daného dne
    pub time_known: bool,
}

impl RaceStart {
    /// Místní kalendářní datum (identita dostihu)
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    pub fn to_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339()
    }
}

pub fn venue_offset(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours.checked_mul(3600)?)
}

/// Najde časový token v hlavičce, např. "Race 4 - 515m 8:45 pm" → "8:45 pm"
pub fn find_time_token(text: &str) -> Option<String> {
    TIME_RE.find(text).map(|m| m.as_str().to_string())
}

/// "8:45PM" / "8:45 pm" / "12:05AM" → NaiveTime
pub fn parse_clock(text: &str) -> Option<NaiveTime> {
    let caps = TIME_RE.captures(text)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    let meridiem = caps[3].to_ascii_uppercase();

    if !(1..=12).contains(&hour) {
        return None;
    }

    let hour24 = match (hour, meridiem.as_str()) {
        (12, "AM") => 0,
        (12, _) => 12,
        (h, "PM") => h + 12,
        (h, _) => h,
    };

    NaiveTime::from_hms_opt(hour24, minute, 0)
}

/// Místní wall-clock čas → timestamp s pevným offsetem
pub fn at_offset(local: NaiveDateTime, offset: FixedOffset) -> DateTime<FixedOffset> {
    let utc = local - TimeDelta::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, offset)
}

/// Datum mítinku + text času → start. Bez času zůstává jen den (degradovaný, ale platný stav).
pub fn normalize_race_start(date: NaiveDate, time_text: Option<&str>, offset: FixedOffset) -> RaceStart {
    match time_text.and_then(parse_clock) {
        Some(time) => RaceStart {
            timestamp: at_offset(date.and_time(time), offset),
            time_known: true,
        },
        None => RaceStart {
            timestamp: at_offset(date.and_time(NaiveTime::MIN), offset),
            time_known: false,
        },
    }
}

/// Aktuální okamžik převedený do kanonického offsetu
pub fn local_now(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    now.with_timezone(&offset)
}

/// "Dnes" z pohledu dráhy, ne serveru
pub fn local_today(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    local_now(now, offset).date_naive()
}

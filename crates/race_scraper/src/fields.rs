//! Fields extractor – startovní listiny jednoho mítinku
//!
//! Pravidla:
//! - bez data v titulku se nevrací nic (žádné hádání data)
//! - dostih bez "Race <n>" se přeskočí
//! - běžci jen z desktop tabulky daného dostihu (stránka má i mobilní kopii)
//! - vacant box = pryč úplně, scratched = zůstává s příznakem

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::text_of;
use crate::timing::find_time_token;

static EVENT: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".form-guide-field-event").unwrap());
static EVENT_HEADER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".form-guide-field-event__header").unwrap());
static EVENT_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.form-guide-event__table").unwrap());
static SELECTION_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr.form-guide-field-selection").unwrap());
static SELECTION_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.form-guide-field-selection__link").unwrap());
static SELECTION_NAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".form-guide-field-selection__name").unwrap());
static RUG_IMG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img.form-guide-field-selection__rug").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static SPORTSBET_ODDS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[class*="best-odds--sportsbet"]"#).unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static OG_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());

static RACE_NO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Race\s+(\d+)").unwrap());
static DISTANCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b([2-9]\d{2})m\b").unwrap());
static SCR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bSCR(ATCHED)?\b").unwrap());
static RUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Rug\s+(\d+)").unwrap());
static NUMERIC_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})\b").unwrap());
static TEXT_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+([a-z]{3,9})\s+(\d{4})\b").unwrap()
});

const VACANT_CLASS: &str = "form-guide-field-selection--vacant";
const SCRATCHED_CLASS: &str = "form-guide-field-selection--scratched";
const EVENT_CLASS: &str = "form-guide-field-event";
/// Sloupec "Our $" (GHR odds) – 10. buňka řádku
const PRIMARY_ODDS_CELL: usize = 9;

/// Proč je běžec označen jako scratched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScratchReason {
    /// CSS třída na řádku – spolehlivější signál
    CssFlag,
    /// "SCR" / "SCRATCHED" jako samostatné slovo v textu
    TextMarker,
}

impl ScratchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScratchReason::CssFlag => "css-flag",
            ScratchReason::TextMarker => "text-marker",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerRow {
    pub box_number: u32,
    pub dog_name: String,
    pub is_scratched: bool,
    pub scratch_reason: Option<ScratchReason>,
    /// GHR "Our $" cena
    pub odds_primary: Option<f64>,
    /// Sportsbet fixed odds
    pub odds_secondary: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceBlock {
    pub race_number: u32,
    pub header_text: String,
    pub runners: Vec<RunnerRow>,
    pub distance_meters: Option<u32>,
    pub start_time_text: Option<String>,
}

impl RaceBlock {
    /// Jednotka pro "micro-field" – jen neodstoupení běžci
    pub fn active_runner_count(&self) -> u32 {
        self.runners.iter().filter(|r| !r.is_scratched).count() as u32
    }

    pub fn scratched(&self) -> impl Iterator<Item = &RunnerRow> {
        self.runners.iter().filter(|r| r.is_scratched)
    }
}

/// Jeden mítink = jedna dráha + jedno datum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingFields {
    pub meeting_name: String,
    pub meeting_url: String,
    pub date: NaiveDate,
    pub races: Vec<RaceBlock>,
}

/// Celá fields stránka → mítink. None pokud nejde určit datum.
pub fn parse_meeting_fields(html: &str, meeting_name: &str, meeting_url: &str) -> Option<MeetingFields> {
    let document = Html::parse_document(html);

    let Some(date) = resolve_meeting_date(&document) else {
        warn!("Could not resolve meeting date for {} ({}), skipping meeting", meeting_name, meeting_url);
        return None;
    };
    debug!("Meeting {} resolved to {}", meeting_name, date);

    let mut races = Vec::new();
    let mut seen_numbers = HashSet::new();

    for event in document.select(&EVENT) {
        let Some(block) = parse_race_block(event, meeting_name) else {
            continue;
        };

        if !seen_numbers.insert(block.race_number) {
            warn!("{} R{} appears twice on the page, keeping the first block", meeting_name, block.race_number);
            continue;
        }

        info!(
            "Scraped: {} R{} ({}) - {} active runners",
            meeting_name,
            block.race_number,
            block.distance_meters.map_or_else(|| "?m".to_string(), |d| format!("{d}m")),
            block.active_runner_count()
        );
        races.push(block);
    }

    if races.is_empty() {
        warn!("No races found for {}", meeting_name);
    }

    Some(MeetingFields {
        meeting_name: meeting_name.to_string(),
        meeting_url: meeting_url.to_string(),
        date,
        races,
    })
}

/// Datum z <title>, pak og:title, pak první <h1>
pub fn resolve_meeting_date(document: &Html) -> Option<NaiveDate> {
    let title = document.select(&TITLE).next().map(text_of);
    let og_title = document
        .select(&OG_TITLE)
        .next()
        .and_then(|m| m.value().attr("content"))
        .map(str::to_string);
    let h1 = document.select(&H1).next().map(text_of);

    [title, og_title, h1]
        .into_iter()
        .flatten()
        .find_map(|text| parse_date_token(&text))
}

/// "Angle Park Fields 21/01/26" nebo "Addington Race Fields - 22nd Jan 2026"
pub fn parse_date_token(text: &str) -> Option<NaiveDate> {
    let numeric = NUMERIC_DATE_RE.captures_iter(text).find_map(|caps| {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let mut year: i32 = caps[3].parse().ok()?;
        if caps[3].len() == 2 {
            year += 2000;
        }
        NaiveDate::from_ymd_opt(year, month, day)
    });
    if numeric.is_some() {
        return numeric;
    }

    // "2 Races 2026 - 22 Jan 2026": první shoda nemusí být měsíc
    TEXT_DATE_RE.captures_iter(text).find_map(|caps| {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = ["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];
    let lower = name.to_ascii_lowercase();
    let prefix = lower.get(..3)?;
    MONTHS.iter().position(|m| *m == prefix).map(|i| i as u32 + 1)
}

fn parse_race_block(event: ElementRef<'_>, meeting_name: &str) -> Option<RaceBlock> {
    let Some(header) = event.select(&EVENT_HEADER).next() else {
        debug!("Race block without header in {}, skipping", meeting_name);
        return None;
    };
    let header_text = text_of(header);

    let race_number = RACE_NO_RE
        .captures(&header_text)
        .and_then(|c| c[1].parse::<u32>().ok())
        .filter(|n| *n > 0);
    let Some(race_number) = race_number else {
        warn!("No race number in header '{}' ({}), skipping block", header_text, meeting_name);
        return None;
    };

    let start_time_text = find_time_token(&header_text);
    if start_time_text.is_none() {
        warn!("No time found in header for {} R{}: '{}'", meeting_name, race_number, header_text);
    }

    // Vzdálenost bývá mimo hlavičku, hledá se v celém bloku (200–999 m)
    let distance_meters = DISTANCE_RE
        .captures(&text_of(event))
        .and_then(|c| c[1].parse::<u32>().ok());

    let Some(table) = event.select(&EVENT_TABLE).next() else {
        warn!("No runner table for {} R{}, skipping block", meeting_name, race_number);
        return None;
    };

    let runners = parse_runner_rows(event, table, meeting_name, race_number);

    Some(RaceBlock {
        race_number,
        header_text,
        runners,
        distance_meters,
        start_time_text,
    })
}

/// Řádky jen z této tabulky a jen ty, které patří tomuto dostihu (ne vnořenému)
fn parse_runner_rows(event: ElementRef<'_>, table: ElementRef<'_>, meeting_name: &str, race_number: u32) -> Vec<RunnerRow> {
    let rows: Vec<ElementRef<'_>> = table
        .select(&SELECTION_ROW)
        .filter(|row| row.select(&SELECTION_LINK).next().is_some())
        .filter(|row| owning_event(*row).map(|e| e.id()) == Some(event.id()))
        .filter(|row| !has_class(*row, VACANT_CLASS))
        .collect();

    debug!("{} R{}: {} runner rows after vacant filter", meeting_name, race_number, rows.len());

    let mut runners = Vec::with_capacity(rows.len());
    for (idx, row) in rows.into_iter().enumerate() {
        match parse_runner_row(row, idx as u32 + 1) {
            Some(runner) => runners.push(runner),
            None => debug!("{} R{}: dropped row {}", meeting_name, race_number, idx + 1),
        }
    }

    let scratched: Vec<String> = runners
        .iter()
        .filter(|r| r.is_scratched)
        .map(|r| format!("Box {} {} ({})", r.box_number, r.dog_name, r.scratch_reason.map_or("?", |s| s.as_str())))
        .collect();
    if !scratched.is_empty() {
        debug!("{} R{} scratchings: {}", meeting_name, race_number, scratched.join(", "));
    }

    runners
}

fn parse_runner_row(row: ElementRef<'_>, position: u32) -> Option<RunnerRow> {
    let text = text_of(row);
    let upper = text.to_uppercase();

    // Pojistka – vacant box bez CSS třídy
    if upper.contains("VACANT BOX") {
        return None;
    }

    let scratch_reason = if has_class(row, SCRATCHED_CLASS) {
        Some(ScratchReason::CssFlag)
    } else if SCR_RE.is_match(&upper) {
        Some(ScratchReason::TextMarker)
    } else {
        None
    };

    let dog_name = [&*SELECTION_NAME, &*SELECTION_LINK]
        .into_iter()
        .filter_map(|sel| row.select(sel).next())
        .map(text_of)
        .find(|name| !name.is_empty());
    let Some(dog_name) = dog_name else {
        warn!("Skipping runner {}: no name element. Text: {}", position, text.chars().take(50).collect::<String>());
        return None;
    };

    // Pozice je jen fallback, scratchingy dělají mezery – rug obrázek má přednost
    let box_number = row
        .select(&RUG_IMG)
        .next()
        .and_then(|img| img.value().attr("alt"))
        .and_then(|alt| RUG_RE.captures(alt))
        .and_then(|c| c[1].parse::<u32>().ok())
        .filter(|b| *b > 0)
        .unwrap_or(position);

    let cells: Vec<ElementRef<'_>> = row.select(&CELL).collect();
    let odds_primary = cells.get(PRIMARY_ODDS_CELL).and_then(|c| parse_odds(&text_of(*c)));
    let odds_secondary = row.select(&SPORTSBET_ODDS).next().and_then(|e| parse_odds(&text_of(e)));

    Some(RunnerRow {
        box_number,
        dog_name,
        is_scratched: scratch_reason.is_some(),
        scratch_reason,
        odds_primary,
        odds_secondary,
    })
}

/// "$4.60" / "1,000.00" → f64
pub fn parse_odds(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| *c != '$' && *c != ',').collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

fn owning_event(row: ElementRef<'_>) -> Option<ElementRef<'_>> {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| has_class(*el, EVENT_CLASS))
}

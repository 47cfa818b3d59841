//! Results extractor
//!
//! Stránka výsledků ukazuje vždy jen jeden dostih, ostatní se přepínají navigací.
//! Pro každý dostih: aktivovat → počkat na render → vzít tabulku.
//! Samotné ovládání stránky je za traitem `RaceViewSession` (Chrome / testy).

use anyhow::Result;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::text_of;

static RESULT_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.results-event__table").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

static BOX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d+)\)").unwrap());
static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$?(\d+(?:\.\d+)?)").unwrap());

/// Tabulka má 12+ sloupců: místo, …, "Jméno (box)", …, SP
const MIN_CELLS: usize = 12;
const PLACE_CELL: usize = 0;
const NAME_CELL: usize = 2;
const SP_CELL: usize = 11;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub box_number: u32,
    pub dog_name: String,
    pub finishing_position: u32,
    /// 0.0 = žádná platná cena (není to totéž co chybějící)
    pub starting_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceResults {
    pub meeting_name: String,
    pub race_number: u32,
    pub rows: Vec<ResultRow>,
}

impl RaceResults {
    /// Dostih bez jediné kladné SP – výsledky se uloží, statistika ne
    pub fn all_prices_missing(&self) -> bool {
        !self.rows.iter().any(|r| r.starting_price.is_some_and(|sp| sp > 0.0))
    }
}

/// Ovládání stránky výsledků jednoho mítinku
pub trait RaceViewSession {
    /// Čísla dostihů z navigace, v pořadí na stránce
    fn race_labels(&mut self) -> Result<Vec<u32>>;
    /// Přepne na dostih; chyba = tlačítko nejde kliknout (typicky už je aktivní)
    fn activate(&mut self, race_number: u32) -> Result<()>;
    /// Omezené čekání na tabulku výsledků
    fn wait_for_render(&mut self);
    fn snapshot(&mut self) -> Result<String>;
}

/// Projde všechny dostihy mítinku. Chyba jednoho dostihu neukončí ostatní.
pub fn collect_meeting_results<S: RaceViewSession + ?Sized>(session: &mut S, meeting_name: &str) -> Vec<RaceResults> {
    let labels = match session.race_labels() {
        Ok(labels) => dedupe_labels(labels),
        Err(e) => {
            warn!("Race navigation lookup failed for {}: {:#}", meeting_name, e);
            Vec::new()
        }
    };
    info!("Found {} race buttons for {}", labels.len(), meeting_name);

    if labels.is_empty() {
        // Jednodostihová stránka bez navigace
        return match session.snapshot() {
            Ok(html) => race_from_snapshot(&html, meeting_name, 1).into_iter().collect(),
            Err(e) => {
                warn!("Snapshot failed for {}: {:#}", meeting_name, e);
                Vec::new()
            }
        };
    }

    let mut results: Vec<RaceResults> = Vec::with_capacity(labels.len());

    for race_number in labels {
        debug!("  Clicking race {}...", race_number);
        match session.activate(race_number) {
            Ok(()) => session.wait_for_render(),
            Err(e) => debug!("    {} R{} not clickable ({:#}), reading current view", meeting_name, race_number, e),
        }

        let html = match session.snapshot() {
            Ok(html) => html,
            Err(e) => {
                warn!("Snapshot failed for {} R{}: {:#}", meeting_name, race_number, e);
                continue;
            }
        };

        let Some(race) = race_from_snapshot(&html, meeting_name, race_number) else {
            continue;
        };

        // Přepnutí se neprojevilo – stejná tabulka jako minule by se zapsala k cizímu dostihu
        if results.last().is_some_and(|prev| prev.rows == race.rows) {
            warn!("{} R{} shows the same table as R{}, skipping", meeting_name, race_number, race_number.saturating_sub(1));
            continue;
        }

        info!("    -> Scraped {} runners for {} R{}", race.rows.len(), meeting_name, race_number);
        results.push(race);
    }

    results
}

fn dedupe_labels(labels: Vec<u32>) -> Vec<u32> {
    let mut seen = HashSet::new();
    labels.into_iter().filter(|n| *n > 0 && seen.insert(*n)).collect()
}

fn race_from_snapshot(html: &str, meeting_name: &str, race_number: u32) -> Option<RaceResults> {
    match parse_result_table(html) {
        Some(rows) if !rows.is_empty() => Some(RaceResults {
            meeting_name: meeting_name.to_string(),
            race_number,
            rows,
        }),
        Some(_) => {
            warn!("    -> Parsed no data for {} R{}", meeting_name, race_number);
            None
        }
        None => {
            warn!("    -> No results table found for {} R{}", meeting_name, race_number);
            None
        }
    }
}

/// None = tabulka na stránce není; prázdný Vec = tabulka bez použitelných řádků
pub fn parse_result_table(html: &str) -> Option<Vec<ResultRow>> {
    let document = Html::parse_document(html);
    let table = document.select(&RESULT_TABLE).next()?;
    Some(table.select(&ROW).filter_map(parse_result_row).collect())
}

fn parse_result_row(row: ElementRef<'_>) -> Option<ResultRow> {
    let cells: Vec<ElementRef<'_>> = row.select(&CELL).collect();
    if cells.len() < MIN_CELLS {
        return None;
    }

    let finishing_position = text_of(cells[PLACE_CELL])
        .parse::<u32>()
        .ok()
        .filter(|p| *p > 0)?;

    let name_with_box = text_of(cells[NAME_CELL]);
    let box_number = BOX_RE
        .captures(&name_with_box)
        .and_then(|c| c[1].parse::<u32>().ok())
        .filter(|b| *b > 0)?;
    let dog_name = BOX_RE.replace_all(&name_with_box, "").trim().to_string();
    if dog_name.is_empty() {
        return None;
    }

    let starting_price = PRICE_RE
        .captures(&text_of(cells[SP_CELL]))
        .and_then(|c| c[1].parse::<f64>().ok());

    Some(ResultRow {
        box_number,
        dog_name,
        finishing_position,
        starting_price,
    })
}

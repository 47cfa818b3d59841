//! Odvozené statistiky po dostihu
//! "Top 2 in Top 2": shodují se dva favoriti (nejnižší SP) s prvními dvěma v cíli?
//!
//! None = nelze vyhodnotit (chybí ceny nebo umístění), Some(false) = vyhodnoceno, neshoda.
//! Tohle rozlišení se nesmí slít – None se nepočítá do jmenovatele úspěšnosti.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Minimální počet aktivních běžců pro "micro-field"
pub const MICRO_FIELD_MIN: u32 = 4;
/// Maximální počet aktivních běžců pro "micro-field"
pub const MICRO_FIELD_MAX: u32 = 5;

/// Výsledek jednoho běžce, jak ho vidí kalkulačka
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunnerOutcome {
    pub box_number: u32,
    pub starting_price: Option<f64>,
    pub finishing_position: Option<u32>,
}

impl RunnerOutcome {
    /// SP je platná jen pokud je přítomná a striktně kladná ($0.00 = žádná cena)
    pub fn valid_price(&self) -> Option<f64> {
        self.starting_price.filter(|sp| *sp > 0.0)
    }
}

/// Počet běžců s platnou SP
pub fn priced_runner_count(runners: &[RunnerOutcome]) -> usize {
    runners.iter().filter(|r| r.valid_price().is_some()).count()
}

/// Má dostih aspoň jednu nenulovou SP? Dostih bez cen se ukládá, jen se nevyhodnocuje.
pub fn has_valid_prices(runners: &[RunnerOutcome]) -> bool {
    priced_runner_count(runners) > 0
}

/// Boxy dvou favoritů – stabilní řazení podle (SP, box), bere první dva
pub fn favourite_boxes(runners: &[RunnerOutcome]) -> Option<BTreeSet<u32>> {
    let mut priced: Vec<(f64, u32)> = runners
        .iter()
        .filter_map(|r| r.valid_price().map(|sp| (sp, r.box_number)))
        .collect();

    if priced.len() < 2 {
        return None;
    }

    priced.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    Some(priced.iter().take(2).map(|(_, b)| *b).collect())
}

/// Boxy prvních dvou v cíli – řazení podle (umístění, box)
pub fn finisher_boxes(runners: &[RunnerOutcome]) -> Option<BTreeSet<u32>> {
    let mut placed: Vec<(u32, u32)> = runners
        .iter()
        .filter_map(|r| r.finishing_position.map(|pos| (pos, r.box_number)))
        .collect();

    if placed.len() < 2 {
        return None;
    }

    placed.sort_unstable();
    Some(placed.iter().take(2).map(|(_, b)| *b).collect())
}

/// Hlavní metrika. Pořadí vstupu nehraje roli, opakovaný výpočet dá stejný výsledek.
pub fn top_two_in_top_two(runners: &[RunnerOutcome]) -> Option<bool> {
    let favourites = favourite_boxes(runners)?;
    let finishers = finisher_boxes(runners)?;
    Some(favourites == finishers)
}

/// Úspěšnost přes vyhodnocené dostihy; None hodnoty se nepočítají vůbec
pub fn hit_rate(flags: &[Option<bool>]) -> Option<f64> {
    let evaluated: Vec<bool> = flags.iter().flatten().copied().collect();
    if evaluated.is_empty() {
        return None;
    }
    let hits = evaluated.iter().filter(|f| **f).count();
    Some(hits as f64 / evaluated.len() as f64)
}

pub fn is_micro_field(active_runner_count: u32) -> bool {
    (MICRO_FIELD_MIN..=MICRO_FIELD_MAX).contains(&active_runner_count)
}

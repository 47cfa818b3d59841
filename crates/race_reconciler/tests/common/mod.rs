#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use race_reconciler::{MatchPolicy, Reconciler};
use race_scraper::{MeetingFields, PageSource, RaceBlock, RaceResults, ResultRow, RunnerRow, ScratchReason};
use race_store::SqliteStore;
use std::collections::HashMap;
use std::sync::Mutex;

pub fn aedt() -> FixedOffset {
    FixedOffset::east_opt(11 * 3600).unwrap()
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
}

/// 23:30 AEDT daného dne – večerní dostihy už odstartovaly
pub fn night(day: u32) -> DateTime<FixedOffset> {
    aedt().with_ymd_and_hms(2026, 1, day, 23, 30, 0).unwrap()
}

pub fn reconciler() -> Reconciler<SqliteStore> {
    Reconciler::new(SqliteStore::open_in_memory().unwrap(), aedt(), MatchPolicy::default())
}

pub fn runner(box_number: u32, name: &str, scratched: bool) -> RunnerRow {
    RunnerRow {
        box_number,
        dog_name: name.to_string(),
        is_scratched: scratched,
        scratch_reason: scratched.then_some(ScratchReason::CssFlag),
        odds_primary: Some(f64::from(box_number) + 1.5),
        odds_secondary: None,
    }
}

pub fn race(number: u32, time: Option<&str>, runners: Vec<RunnerRow>) -> RaceBlock {
    RaceBlock {
        race_number: number,
        header_text: format!("Race {number}"),
        runners,
        distance_meters: Some(515),
        start_time_text: time.map(str::to_string),
    }
}

pub fn meeting(name: &str, day: u32, races: Vec<RaceBlock>) -> MeetingFields {
    MeetingFields {
        meeting_name: name.to_string(),
        meeting_url: format!(
            "https://www.thegreyhoundrecorder.com.au/form-guides/{}/fields/25{day:04}/",
            name.to_lowercase().replace(' ', "-")
        ),
        date: date(day),
        races,
    }
}

pub fn result(box_number: u32, name: &str, position: u32, sp: Option<f64>) -> ResultRow {
    ResultRow {
        box_number,
        dog_name: name.to_string(),
        finishing_position: position,
        starting_price: sp,
    }
}

pub fn results(meeting_name: &str, race_number: u32, rows: Vec<ResultRow>) -> RaceResults {
    RaceResults {
        meeting_name: meeting_name.to_string(),
        race_number,
        rows,
    }
}

// ── HTML fixtures ─────────────────────────────────────────────────────────────

pub fn index_page(fields_urls: &[&str]) -> String {
    let links: String = fields_urls
        .iter()
        .map(|u| format!(r#"<a class="meetings__row-btn" href="{u}">Fields</a>"#))
        .collect();
    format!(
        r#"<html><body>
             <h2 class="meeting-list__title">Thursday, January 22</h2>
             <div class="meetings">{links}</div>
           </body></html>"#
    )
}

/// Fields stránka: (číslo, čas, [(box, jméno, scratched)])
pub fn fields_page(title: &str, races: &[(u32, &str, &[(u32, &str, bool)])]) -> String {
    let mut events = String::new();
    for (number, time, runners) in races {
        let mut rows = String::new();
        for (box_number, name, scratched) in runners.iter() {
            let class = if *scratched { "form-guide-field-selection--scratched" } else { "" };
            rows.push_str(&format!(
                r#"<tr class="form-guide-field-selection {class}">
                     <td><img class="form-guide-field-selection__rug" alt="Rug {box_number}"></td>
                     <td><a class="form-guide-field-selection__link">{name}</a></td>
                   </tr>"#
            ));
        }
        events.push_str(&format!(
            r#"<div class="form-guide-field-event">
                 <div class="form-guide-field-event__header">Race {number} 515m {time}</div>
                 <table class="form-guide-event__table">{rows}</table>
               </div>"#
        ));
    }
    format!("<html><head><title>{title}</title></head><body>{events}</body></html>")
}

pub fn archive_page(results_paths: &[&str]) -> String {
    let links: String = results_paths
        .iter()
        .map(|p| format!(r#"<a href="{p}">Results</a>"#))
        .collect();
    format!("<html><body>{links}</body></html>")
}

/// Falešný zdroj stránek: URL → HTML, results URL → hotové výsledky
#[derive(Default)]
pub struct FakeSource {
    pub pages: HashMap<String, String>,
    pub results: HashMap<String, Vec<RaceResults>>,
    pub requested: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn page(mut self, url: &str, html: String) -> Self {
        self.pages.insert(url.to_string(), html);
        self
    }

    pub fn results(mut self, url: &str, races: Vec<RaceResults>) -> Self {
        self.results.insert(url.to_string(), races);
        self
    }

    fn note(&self, url: &str) {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(url.to_string());
        }
    }
}

impl PageSource for FakeSource {
    async fn render(&self, url: &str, _marker: &str) -> Option<String> {
        self.note(url);
        self.pages.get(url).cloned()
    }

    async fn meeting_results(&self, results_url: &str, _meeting_name: &str) -> Option<Vec<RaceResults>> {
        self.note(results_url);
        self.results.get(results_url).cloned()
    }
}

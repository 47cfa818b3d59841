//! Greyhound Recorder scraper – fields (startovní listiny) a výsledky
//!
//! Struktura fields stránky:
//! https://www.thegreyhoundrecorder.com.au/form-guides/<track>/fields/<meeting_id>/
//!   <div class="form-guide-field-event">            ← jeden dostih
//!     <div class="form-guide-field-event__header">  ← "Race 3 ... 520m ... 8:45PM"
//!     <table class="form-guide-event__table">       ← desktop tabulka (mobilní verze se ignoruje)
//!       <tr class="form-guide-field-selection [--scratched|--vacant]">
//!
//! Výsledky:
//! https://www.thegreyhoundrecorder.com.au/results/<track>/<meeting_id>/
//!   nav .meeting-events-nav__item (1, 2, 3 …) přepíná dostihy, tabulka table.results-event__table
//!
//! Parsování je čisté (HTML string → typy), prohlížeč řeší jen `browser`.

pub mod browser;
pub mod fields;
pub mod index;
pub mod results;
pub mod timing;
pub mod urls;

pub use browser::{BrowserConfig, ChromeSource};
pub use fields::{parse_meeting_fields, MeetingFields, RaceBlock, RunnerRow, ScratchReason};
pub use index::{discover_archive_meetings, discover_meetings, MeetingLink};
pub use results::{collect_meeting_results, parse_result_table, RaceResults, RaceViewSession, ResultRow};
pub use timing::{normalize_race_start, RaceStart};

use scraper::ElementRef;

/// Marker pro fields stránku – tabulky plní JavaScript, čekáme na ně
pub const FIELDS_MARKER: &str = "table.form-guide-event__table";
/// Marker pro přehled mítinků
pub const INDEX_MARKER: &str = "h2.meeting-list__title";
/// Marker pro tabulku výsledků
pub const RESULTS_MARKER: &str = "table.results-event__table";

/// Zdroj vyrenderovaných stránek. Výpadek = None, volající mítink přeskočí.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    /// Vrátí HTML po omezeném čekání na `marker`; chybějící marker není chyba
    async fn render(&self, url: &str, marker: &str) -> Option<String>;

    /// Proklikne všechny dostihy na stránce výsledků a vrátí naparsované tabulky
    async fn meeting_results(&self, results_url: &str, meeting_name: &str) -> Option<Vec<RaceResults>>;
}

/// Text elementu s mezerami mezi uzly (jinak se "Race 1" a "8:45PM" slepí)
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

//! URL helpery pro thegreyhoundrecorder.com.au
//!
//! fields:  /form-guides/angle-park/fields/250176/
//! results: /results/angle-park/250176/
//! Rekonstruované URL používají DDMMYY místo skutečného ID – web je občas přijme,
//! ale archiv je za platné nepovažuje (viz `has_real_meeting_id`).

use chrono::NaiveDate;

pub const BASE_URL: &str = "https://www.thegreyhoundrecorder.com.au";
pub const FORM_GUIDE_URL: &str = "https://www.thegreyhoundrecorder.com.au/form-guides/";
pub const RESULTS_URL: &str = "https://www.thegreyhoundrecorder.com.au/results/";

/// Skutečná meeting ID jsou sekvenční a vysoká; menší čísla bývají DDMMYY data
pub const MIN_REAL_MEETING_ID: u64 = 240_000;

pub fn absolute_url(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{BASE_URL}{href}")
    } else {
        format!("{BASE_URL}/{href}")
    }
}

pub fn fields_to_results_url(fields_url: &str) -> String {
    fields_url
        .replace("/form-guides/", "/results/")
        .replace("/fields/", "/")
}

/// Opačný směr pro archiv: /results/angle-park/250176/ → /form-guides/angle-park/fields/250176/
pub fn results_to_fields_url(results_url: &str) -> Option<String> {
    let slug = track_slug(results_url)?;
    let id = meeting_id(results_url)?;
    Some(format!("{BASE_URL}/form-guides/{slug}/fields/{id}/"))
}

/// "Angle Park" → "angle-park"
pub fn meeting_slug(meeting_name: &str) -> String {
    meeting_name
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// "angle-park" → "Angle Park"
pub fn meeting_name_from_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Fields URL z názvu mítinku a data (když v DB chybí)
pub fn reconstruct_fields_url(meeting_name: &str, date: NaiveDate) -> String {
    format!(
        "{BASE_URL}/form-guides/{}/fields/{}/",
        meeting_slug(meeting_name),
        date.format("%d%m%y")
    )
}

pub fn results_archive_url(date: NaiveDate) -> String {
    format!("{RESULTS_URL}?date={}", date.format("%Y-%m-%d"))
}

fn path_segments(url: &str) -> Vec<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    path.split('/').skip(1).filter(|s| !s.is_empty()).collect()
}

/// Slug dráhy hned za "/form-guides/" nebo "/results/"
pub fn track_slug(url: &str) -> Option<String> {
    let segments = path_segments(url);
    let pos = segments
        .iter()
        .position(|s| *s == "form-guides" || *s == "results")?;
    segments.get(pos + 1).map(|s| s.to_string())
}

/// Poslední čistě číselný segment cesty
pub fn meeting_id(url: &str) -> Option<u64> {
    path_segments(url)
        .last()
        .filter(|s| s.chars().all(|c| c.is_ascii_digit()))
        .and_then(|s| s.parse().ok())
}

pub fn has_real_meeting_id(url: &str) -> bool {
    meeting_id(url).is_some_and(|id| id >= MIN_REAL_MEETING_ID)
}

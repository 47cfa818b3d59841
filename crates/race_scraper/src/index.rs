//! Přehled mítinků (form-guides) a archiv výsledků
//!
//! Form guides: h2.meeting-list__title = jeden den, pod ním sourozenci s tlačítky
//! a.meetings__row-btn ("Fields"). Bereme první N dnů (dnes, zítra).

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::text_of;
use crate::urls::{absolute_url, has_real_meeting_id, meeting_id, meeting_name_from_slug, results_to_fields_url, track_slug};

static DAY_HEADER: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2.meeting-list__title").unwrap());
static ROW_BUTTON: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a.meetings__row-btn").unwrap());
static RESULTS_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse(r#"a[href*="/results/"]"#).unwrap());
static RESULTS_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/results/[a-z0-9-]+/\d+/?$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingLink {
    pub name: String,
    pub fields_url: String,
}

impl MeetingLink {
    /// Název z URL slugu – "/form-guides/the-meadows/fields/…" → "The Meadows"
    pub fn from_fields_url(fields_url: &str) -> Option<Self> {
        let slug = track_slug(fields_url)?;
        Some(Self {
            name: meeting_name_from_slug(&slug),
            fields_url: fields_url.to_string(),
        })
    }
}

/// Mítinky z prvních `max_days` denních sekcí
pub fn discover_meetings(html: &str, max_days: usize) -> Vec<MeetingLink> {
    let document = Html::parse_document(html);
    let headers: Vec<ElementRef<'_>> = document.select(&DAY_HEADER).collect();

    if headers.is_empty() {
        warn!("No date headers on form guide index");
        return Vec::new();
    }
    debug!("Found {} date headers", headers.len());

    let mut seen = HashSet::new();
    let mut meetings = Vec::new();

    for header in headers.into_iter().take(max_days) {
        info!("--- Scanning {} ---", text_of(header));

        let section = header
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .take_while(|el| el.value().name() != "h2");

        for block in section {
            for link in block.select(&ROW_BUTTON) {
                if !text_of(link).contains("Fields") {
                    continue;
                }
                let Some(href) = link.value().attr("href") else {
                    continue;
                };
                let url = absolute_url(href);
                if !seen.insert(url.clone()) {
                    continue;
                }
                match MeetingLink::from_fields_url(&url) {
                    Some(meeting) => meetings.push(meeting),
                    None => debug!("Fields link without track slug: {}", url),
                }
            }
        }
    }

    info!("Discovered {} meetings", meetings.len());
    meetings
}

/// Archiv výsledků pro jedno datum → název mítinku → fields URL.
/// Odkazy s ID ve tvaru data (DDMMYY) nejsou skutečné mítinky a zahazují se.
pub fn discover_archive_meetings(html: &str) -> BTreeMap<String, String> {
    let document = Html::parse_document(html);
    let mut meetings = BTreeMap::new();

    for link in document.select(&RESULTS_LINK) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let path = href.split(['?', '#']).next().unwrap_or(href);
        if !RESULTS_PATH_RE.is_match(path) {
            continue;
        }
        if !has_real_meeting_id(path) {
            debug!("Skipping likely date-shaped ID: {} ({:?})", path, meeting_id(path));
            continue;
        }
        let Some(fields_url) = results_to_fields_url(&absolute_url(path)) else {
            continue;
        };
        let Some(meeting) = MeetingLink::from_fields_url(&fields_url) else {
            continue;
        };
        meetings.entry(meeting.name).or_insert(meeting.fields_url);
    }

    info!("Archive lists {} meetings", meetings.len());
    meetings
}

//! Konfigurace běhu z env proměnných (.env přes dotenv v binárkách)

use anyhow::{Context, Result};
use chrono::FixedOffset;
use race_scraper::timing::venue_offset;
use race_scraper::BrowserConfig;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::reconcile::MatchPolicy;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
    /// Kanonický offset pro ukládání i všechny dotazy podle data
    pub utc_offset: FixedOffset,
    /// Kolik denních sekcí form-guide přehledu brát (dnes, zítra)
    pub index_days: usize,
    pub match_policy: MatchPolicy,
    pub browser: BrowserConfig,
    pub ntfy_url: Option<String>,
}

impl RunConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let parsed = |key: &str| -> Option<String> { lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) };
        fn or_default<T: FromStr>(value: Option<String>, default: T) -> T {
            value.and_then(|v| v.parse().ok()).unwrap_or(default)
        }

        // Neplatný offset = fatální – tiše posunuté časy by rozbily identitu dostihů
        let offset_hours: i32 = match parsed("RACE_UTC_OFFSET_HOURS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("RACE_UTC_OFFSET_HOURS is not a whole number of hours: {raw}"))?,
            None => 11,
        };
        let utc_offset = venue_offset(offset_hours)
            .with_context(|| format!("RACE_UTC_OFFSET_HOURS out of range: {offset_hours}"))?;

        let settle_ms: u64 = or_default(parsed("RACE_SETTLE_MS"), 2000);
        let browser = BrowserConfig {
            headless: or_default(parsed("RACE_BROWSER_HEADLESS"), true),
            page_timeout: Duration::from_secs(or_default(parsed("RACE_PAGE_TIMEOUT_SECS"), 90)),
            marker_wait: Duration::from_secs(or_default(parsed("RACE_MARKER_WAIT_SECS"), 15)),
            settle: Duration::from_millis(settle_ms),
            fallback_settle: Duration::from_millis(settle_ms.saturating_mul(2)),
            ..BrowserConfig::default()
        };

        Ok(Self {
            db_path: PathBuf::from(parsed("RACE_DB_PATH").unwrap_or_else(|| "data/races.db".to_string())),
            log_dir: PathBuf::from(parsed("RACE_LOG_DIR").unwrap_or_else(|| "logs".to_string())),
            utc_offset,
            index_days: or_default(parsed("RACE_INDEX_DAYS"), 2),
            match_policy: MatchPolicy {
                min_confirmed_runners: or_default(parsed("RACE_MATCH_MIN_CONFIRMED"), 1),
            },
            browser,
            ntfy_url: parsed("RACE_NTFY_URL"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<RunConfig> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        RunConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() -> Result<()> {
        let cfg = config(&[])?;
        assert_eq!(cfg.db_path, PathBuf::from("data/races.db"));
        assert_eq!(cfg.utc_offset.local_minus_utc(), 11 * 3600);
        assert_eq!(cfg.index_days, 2);
        assert_eq!(cfg.match_policy.min_confirmed_runners, 1);
        assert!(cfg.browser.headless);
        assert_eq!(cfg.browser.fallback_settle, Duration::from_millis(4000));
        assert!(cfg.ntfy_url.is_none());
        Ok(())
    }

    #[test]
    fn overrides_and_garbage() -> Result<()> {
        let cfg = config(&[
            ("RACE_UTC_OFFSET_HOURS", "10"),
            ("RACE_INDEX_DAYS", "abc"),
            ("RACE_BROWSER_HEADLESS", "false"),
            ("RACE_SETTLE_MS", "500"),
            ("RACE_NTFY_URL", "https://ntfy.sh/greyhounds"),
        ])?;
        assert_eq!(cfg.utc_offset.local_minus_utc(), 10 * 3600);
        assert_eq!(cfg.index_days, 2);
        assert!(!cfg.browser.headless);
        assert_eq!(cfg.browser.fallback_settle, Duration::from_millis(1000));
        assert_eq!(cfg.ntfy_url.as_deref(), Some("https://ntfy.sh/greyhounds"));
        Ok(())
    }

    #[test]
    fn invalid_offset_is_fatal() {
        assert!(config(&[("RACE_UTC_OFFSET_HOURS", "+11:00")]).is_err());
        assert!(config(&[("RACE_UTC_OFFSET_HOURS", "30")]).is_err());
    }
}

//! Chrome page source (headless_chrome)
//!
//! Stránky plní tabulky až JavaScriptem, obyčejný HTTP GET vrací prázdnou kostru.
//! Každý fetch = vlastní Chrome v blocking poolu, omezený timeoutem.
//! Selhání → jeden retry s delším čekáním → None (mítink se přeskočí).

use anyhow::{bail, Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::results::{collect_meeting_results, RaceResults, RaceViewSession};
use crate::{PageSource, RESULTS_MARKER};

const NAV_ITEMS: &str = ".meeting-events-nav__item";
const NAV_FALLBACK: &str = "nav div, nav button, nav a";
/// Fallback navigace bere jen malá čísla (jinak chytá datumy a stránkování)
const MAX_FALLBACK_LABEL: u32 = 15;

const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
];

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    /// Horní mez jednoho pokusu (launch + navigate + render)
    pub page_timeout: Duration,
    /// Jak dlouho čekat na marker obsahu
    pub marker_wait: Duration,
    pub settle: Duration,
    /// Settle pro retry
    pub fallback_settle: Duration,
    /// Pauza mezi spuštěními Chrome
    pub min_interval: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            page_timeout: Duration::from_secs(90),
            marker_wait: Duration::from_secs(15),
            settle: Duration::from_millis(2000),
            fallback_settle: Duration::from_millis(4000),
            min_interval: Duration::from_secs(2),
        }
    }
}

pub struct ChromeSource {
    config: BrowserConfig,
    ua_index: AtomicUsize,
    last_launch: Mutex<Instant>,
}

impl ChromeSource {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            ua_index: AtomicUsize::new(0),
            last_launch: Mutex::new(Instant::now() - Duration::from_secs(60)),
        }
    }

    fn next_user_agent(&self) -> &'static str {
        let idx = self.ua_index.fetch_add(1, Ordering::Relaxed);
        USER_AGENTS[idx % USER_AGENTS.len()]
    }

    async fn wait_for_rate_limit(&self) {
        let remaining = match self.last_launch.lock() {
            Ok(mut last) => {
                let elapsed = last.elapsed();
                let remaining = self.config.min_interval.saturating_sub(elapsed);
                *last = Instant::now() + remaining;
                remaining
            }
            Err(_) => Duration::ZERO,
        };
        if !remaining.is_zero() {
            debug!("Browser rate limit: waiting {}ms", remaining.as_millis());
            sleep(remaining).await;
        }
    }

    /// Jeden pokus v blocking poolu s horním časovým limitem
    async fn attempt<T, F>(&self, url: &str, settle: Duration, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab, Duration) -> Result<T> + Send + 'static,
    {
        self.wait_for_rate_limit().await;

        let config = self.config.clone();
        let user_agent = self.next_user_agent();
        let target = url.to_string();

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let handle = task::spawn_blocking(move || -> Result<T> {
            let (_browser, tab) = open_tab(&config, user_agent)?;
            ensure_live(&flag)?;
            tab.navigate_to(&target).context("Chrome navigate failed")?;
            tab.wait_until_navigated().context("Chrome navigation did not finish")?;
            ensure_live(&flag)?;
            job(&*tab, settle)
        });

        match timeout(self.config.page_timeout, handle).await {
            Ok(joined) => joined.context("Browser task panicked")?,
            Err(_) => {
                // Blokující krok nejde přerušit: job skončí u další kontroly a drop Browseru zavře Chrome.
                // Do té doby může retry běžet vedle něj, nejdéle default timeout tabu.
                cancelled.store(true, Ordering::Relaxed);
                bail!("Page load exceeded {}s", self.config.page_timeout.as_secs())
            }
        }
    }

    /// Pokus + retry s delším settle; druhé selhání = None
    async fn with_retry<T, F>(&self, url: &str, job: F) -> Option<T>
    where
        T: Send + 'static,
        F: Fn(&Tab, Duration) -> Result<T> + Send + Sync + Clone + 'static,
    {
        let settles = [self.config.settle, self.config.fallback_settle];
        for (attempt, settle) in settles.into_iter().enumerate() {
            match self.attempt(url, settle, job.clone()).await {
                Ok(value) => return Some(value),
                Err(e) if attempt == 0 => {
                    warn!("Fetch failed for {} ({:#}), retrying with {}ms settle", url, e, self.config.fallback_settle.as_millis());
                }
                Err(e) => {
                    warn!("Fetch failed twice for {}: {:#}", url, e);
                }
            }
        }
        None
    }
}

impl PageSource for ChromeSource {
    async fn render(&self, url: &str, marker: &str) -> Option<String> {
        info!("Navigating to {}...", url);
        let marker = marker.to_string();
        let marker_wait = self.config.marker_wait;

        self.with_retry(url, move |tab, settle| {
            wait_for_marker(tab, &marker, marker_wait);
            std::thread::sleep(settle);
            tab.get_content().context("Failed to read HTML from browser tab")
        })
        .await
    }

    async fn meeting_results(&self, results_url: &str, meeting_name: &str) -> Option<Vec<RaceResults>> {
        info!("Navigating to {}...", results_url);
        let meeting = meeting_name.to_string();
        let marker_wait = self.config.marker_wait;

        self.with_retry(results_url, move |tab, settle| {
            wait_for_marker(tab, RESULTS_MARKER, marker_wait);
            std::thread::sleep(settle);
            let mut session = ChromeResultsSession {
                tab,
                marker_wait,
                settle: settle.max(Duration::from_secs(3)),
            };
            Ok(collect_meeting_results(&mut session, &meeting))
        })
        .await
    }
}

fn open_tab(config: &BrowserConfig, user_agent: &str) -> Result<(Browser, Arc<Tab>)> {
    let options = LaunchOptions::default_builder()
        .headless(config.headless)
        .sandbox(false)
        .window_size(Some((1366, 900)))
        .idle_browser_timeout(config.page_timeout + Duration::from_secs(30))
        .build()
        .context("Failed to build Chrome launch options")?;

    let browser = Browser::new(options).context("Failed to launch Chrome")?;
    let tab = browser.new_tab().context("Failed to create browser tab")?;
    tab.set_default_timeout(config.page_timeout);
    tab.set_user_agent(user_agent, Some("en-AU,en;q=0.9"), None)
        .context("Failed to set user agent")?;

    Ok((browser, tab))
}

/// Zrušený pokus (timeout už vypršel) nepokračuje dalším krokem
fn ensure_live(cancelled: &AtomicBool) -> Result<()> {
    if cancelled.load(Ordering::Relaxed) {
        bail!("Browser attempt cancelled after timeout");
    }
    Ok(())
}

/// Chybějící marker není chyba – stránka se přečte tak, jak je
fn wait_for_marker(tab: &Tab, marker: &str, wait: Duration) {
    if let Err(e) = tab.wait_for_element_with_custom_timeout(marker, wait) {
        debug!("Marker '{}' not found within {}s: {}", marker, wait.as_secs(), e);
    }
}

/// Výsledková stránka otevřená v Chrome tabu
struct ChromeResultsSession<'a> {
    tab: &'a Tab,
    marker_wait: Duration,
    settle: Duration,
}

impl ChromeResultsSession<'_> {
    /// Navigační prvky s číselným popiskem; prázdné → fallback na cokoliv v <nav>
    fn numbered_nav(&self) -> Vec<(u32, headless_chrome::Element<'_>)> {
        let primary = self.labelled(NAV_ITEMS, u32::MAX);
        if !primary.is_empty() {
            return primary;
        }
        self.labelled(NAV_FALLBACK, MAX_FALLBACK_LABEL)
    }

    fn labelled(&self, selector: &str, max_label: u32) -> Vec<(u32, headless_chrome::Element<'_>)> {
        let elements = self.tab.find_elements(selector).unwrap_or_default();
        elements
            .into_iter()
            .filter_map(|el| {
                let text = el.get_inner_text().ok()?;
                let label = text.trim().parse::<u32>().ok()?;
                (label > 0 && label <= max_label).then_some((label, el))
            })
            .collect()
    }
}

impl RaceViewSession for ChromeResultsSession<'_> {
    fn race_labels(&mut self) -> Result<Vec<u32>> {
        Ok(self.numbered_nav().into_iter().map(|(label, _)| label).collect())
    }

    fn activate(&mut self, race_number: u32) -> Result<()> {
        let nav = self.numbered_nav();
        let Some((_, button)) = nav.into_iter().find(|(label, _)| *label == race_number) else {
            bail!("No navigation item labelled {}", race_number);
        };
        button.click().context("Click failed")?;
        Ok(())
    }

    fn wait_for_render(&mut self) {
        std::thread::sleep(self.settle);
        wait_for_marker(self.tab, RESULTS_MARKER, self.marker_wait);
    }

    fn snapshot(&mut self) -> Result<String> {
        self.tab.get_content().context("Failed to read HTML from browser tab")
    }
}

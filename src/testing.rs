// src/testing.rs
//! In-memory collaborators for unit and integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::analyze::classifier::CLASSIFY_SYSTEM_PROMPT;
use crate::analyze::extractor::EXTRACT_SYSTEM_PROMPT;
use crate::analyze::LanguageModel;
use crate::notify::{NotificationPayload, Notifier};
use crate::scrape::{Format, MapOptions, ScrapedPage, Scraper};
use crate::store::{MemorySheetStore, Row, Sheet, SheetStore};

// ------------------------------------------------------------
// Scraper
// ------------------------------------------------------------

/// Canned pages and map results. Unknown URLs fail.
#[derive(Default)]
pub struct MockScraper {
    pages: HashMap<String, ScrapedPage>,
    maps: HashMap<String, Vec<String>>,
    failing_scrapes: HashSet<String>,
    failing_maps: HashSet<String>,
    flaky: Mutex<HashMap<String, usize>>,
    scrape_calls: Mutex<Vec<String>>,
    map_calls: Mutex<Vec<(String, MapOptions)>>,
}

impl MockScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, markdown: &str) -> Self {
        self.pages.entry(url.to_string()).or_default().markdown = Some(markdown.to_string());
        self
    }

    pub fn with_links(mut self, url: &str, links: &[&str]) -> Self {
        self.pages.entry(url.to_string()).or_default().links =
            Some(links.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn with_map(mut self, url: &str, links: Vec<String>) -> Self {
        self.maps.insert(url.to_string(), links);
        self
    }

    pub fn failing_scrape(mut self, url: &str) -> Self {
        self.failing_scrapes.insert(url.to_string());
        self
    }

    pub fn failing_map(mut self, url: &str) -> Self {
        self.failing_maps.insert(url.to_string());
        self
    }

    /// First `failures` scrapes of `url` fail, later ones succeed.
    pub fn flaky_scrape(self, url: &str, failures: usize) -> Self {
        if let Ok(mut f) = self.flaky.lock() {
            f.insert(url.to_string(), failures);
        }
        self
    }

    pub fn scrape_attempts(&self, url: &str) -> usize {
        self.scrape_calls()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }

    pub fn scrape_calls(&self) -> Vec<String> {
        self.scrape_calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn map_calls(&self) -> Vec<(String, MapOptions)> {
        self.map_calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Scraper for MockScraper {
    async fn scrape(&self, url: &str, formats: &[Format]) -> Result<ScrapedPage> {
        if let Ok(mut calls) = self.scrape_calls.lock() {
            calls.push(url.to_string());
        }
        if self.failing_scrapes.contains(url) {
            return Err(anyhow!("mock scrape failure for {url}"));
        }
        if let Ok(mut flaky) = self.flaky.lock() {
            if let Some(left) = flaky.get_mut(url) {
                if *left > 0 {
                    *left -= 1;
                    return Err(anyhow!("mock transient failure for {url}"));
                }
            }
        }
        let page = self
            .pages
            .get(url)
            .ok_or_else(|| anyhow!("mock has no page for {url}"))?;
        Ok(ScrapedPage {
            markdown: page
                .markdown
                .clone()
                .filter(|_| formats.contains(&Format::Markdown)),
            links: page.links.clone().filter(|_| formats.contains(&Format::Links)),
        })
    }

    async fn map(&self, url: &str, options: &MapOptions) -> Result<Vec<String>> {
        if let Ok(mut calls) = self.map_calls.lock() {
            calls.push((url.to_string(), options.clone()));
        }
        if self.failing_maps.contains(url) {
            return Err(anyhow!("mock map failure for {url}"));
        }
        self.maps
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("mock has no map for {url}"))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Language model
// ------------------------------------------------------------

/// Replies by task (classification or extraction), by a substring of the
/// prompt, or with a default. `failing` errors on every call.
#[derive(Default)]
pub struct MockModel {
    classify_reply: Option<String>,
    extract_reply: Option<String>,
    rules: Vec<(String, String)>,
    default: Option<String>,
    fail: Option<String>,
    calls: AtomicUsize,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn with_default(mut self, reply: &str) -> Self {
        self.default = Some(reply.to_string());
        self
    }

    pub fn on_classify(mut self, reply: &str) -> Self {
        self.classify_reply = Some(reply.to_string());
        self
    }

    pub fn on_extract(mut self, reply: &str) -> Self {
        self.extract_reply = Some(reply.to_string());
        self
    }

    /// Reply when the user prompt contains `needle` (e.g. a URL).
    pub fn with_reply_for(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), reply.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LanguageModel for MockModel {
    async fn complete_json(&self, system: &str, user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.fail {
            return Err(anyhow!("{msg}"));
        }
        if let Some((_, reply)) = self.rules.iter().find(|(n, _)| user.contains(n.as_str())) {
            return Ok(reply.clone());
        }
        let by_task = if system == CLASSIFY_SYSTEM_PROMPT {
            self.classify_reply.as_ref()
        } else if system == EXTRACT_SYSTEM_PROMPT {
            self.extract_reply.as_ref()
        } else {
            None
        };
        by_task
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| anyhow!("mock model has no reply"))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Notifier
// ------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotificationPayload>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the payload, then reports a delivery error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<NotificationPayload> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, payload: &NotificationPayload) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(payload.clone());
        }
        if self.fail {
            return Err(anyhow!("mock webhook unreachable"));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// ------------------------------------------------------------
// Persistence
// ------------------------------------------------------------

/// Memory store whose appends to selected sheets fail, and optionally whose
/// reads fail.
#[derive(Default)]
pub struct FlakySheetStore {
    inner: MemorySheetStore,
    failing_appends: HashSet<Sheet>,
    failing_reads: bool,
}

impl FlakySheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_append(mut self, sheet: Sheet) -> Self {
        self.failing_appends.insert(sheet);
        self
    }

    pub fn failing_reads(mut self) -> Self {
        self.failing_reads = true;
        self
    }

    pub fn rows(&self, sheet: Sheet) -> Vec<Row> {
        self.inner.rows(sheet)
    }
}

#[async_trait::async_trait]
impl SheetStore for FlakySheetStore {
    async fn append(&self, sheet: Sheet, row: Row) -> Result<()> {
        if self.failing_appends.contains(&sheet) {
            return Err(anyhow!("backend rejected append to {sheet}"));
        }
        self.inner.append(sheet, row).await
    }

    async fn read(&self, sheet: Sheet) -> Result<Vec<Row>> {
        if self.failing_reads {
            return Err(anyhow!("backend unreachable"));
        }
        self.inner.read(sheet).await
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

// src/pipeline/stats.rs
//! Per-run counters and failure lists.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Discovery,
    Scrape,
    Classification,
    Extraction,
    Persistence,
}

impl FailureKind {
    pub const ALL: [FailureKind; 5] = [
        FailureKind::Discovery,
        FailureKind::Scrape,
        FailureKind::Classification,
        FailureKind::Extraction,
        FailureKind::Persistence,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Discovery => "discovery",
            FailureKind::Scrape => "scrape",
            FailureKind::Classification => "classification",
            FailureKind::Extraction => "extraction",
            FailureKind::Persistence => "persistence",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: FailureKind,
    pub source_id: String,
    /// Empty for source-level failures.
    pub url: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub sources_processed: usize,
    pub sources_skipped: usize,
    pub urls_discovered: usize,
    pub urls_attempted: usize,
    pub scrape_successes: usize,
    pub classification_successes: usize,
    pub extraction_successes: usize,
    pub proposals_created: usize,
    pub skipped_irrelevant: usize,
    pub discovery_failures: Vec<FailureRecord>,
    pub scrape_failures: Vec<FailureRecord>,
    pub classification_failures: Vec<FailureRecord>,
    pub extraction_failures: Vec<FailureRecord>,
    pub persistence_failures: Vec<FailureRecord>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, rec: FailureRecord) {
        self.list_mut(rec.kind).push(rec);
    }

    pub fn failures(&self, kind: FailureKind) -> &[FailureRecord] {
        match kind {
            FailureKind::Discovery => &self.discovery_failures,
            FailureKind::Scrape => &self.scrape_failures,
            FailureKind::Classification => &self.classification_failures,
            FailureKind::Extraction => &self.extraction_failures,
            FailureKind::Persistence => &self.persistence_failures,
        }
    }

    fn list_mut(&mut self, kind: FailureKind) -> &mut Vec<FailureRecord> {
        match kind {
            FailureKind::Discovery => &mut self.discovery_failures,
            FailureKind::Scrape => &mut self.scrape_failures,
            FailureKind::Classification => &mut self.classification_failures,
            FailureKind::Extraction => &mut self.extraction_failures,
            FailureKind::Persistence => &mut self.persistence_failures,
        }
    }

    pub fn total_failures(&self) -> usize {
        FailureKind::ALL.iter().map(|k| self.failures(*k).len()).sum()
    }

    /// One-line human summary, used for the events row and the notification.
    pub fn summary(&self) -> String {
        let mut s = format!(
            "{} sources ({} skipped), {} URLs discovered, {} analysed: \
             {} scraped, {} classified, {} irrelevant, {} extracted, {} proposals",
            self.sources_processed,
            self.sources_skipped,
            self.urls_discovered,
            self.urls_attempted,
            self.scrape_successes,
            self.classification_successes,
            self.skipped_irrelevant,
            self.extraction_successes,
            self.proposals_created,
        );
        let failed: Vec<String> = FailureKind::ALL
            .iter()
            .filter(|k| !self.failures(**k).is_empty())
            .map(|k| format!("{} {}", self.failures(*k).len(), k))
            .collect();
        if !failed.is_empty() {
            s.push_str("; failures: ");
            s.push_str(&failed.join(", "));
        }
        s
    }
}

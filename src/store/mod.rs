// src/store/mod.rs
//! Table-oriented persistence backend (append + read) and the row shapes we write.

pub mod seen;
pub mod sheets;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

pub use seen::SeenStore;
pub use sheets::SheetsWebApp;

/// Tables used by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sheet {
    Events,
    Discoveries,
    Proposals,
    SeenUrls,
    Failures,
}

impl Sheet {
    pub fn name(self) -> &'static str {
        match self {
            Sheet::Events => "events",
            Sheet::Discoveries => "discoveries",
            Sheet::Proposals => "proposals",
            Sheet::SeenUrls => "seen_urls",
            Sheet::Failures => "failures",
        }
    }
}

impl fmt::Display for Sheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type Row = Vec<Value>;

#[async_trait::async_trait]
pub trait SheetStore: Send + Sync {
    async fn append(&self, sheet: Sheet, row: Row) -> Result<()>;
    async fn read(&self, sheet: Sheet) -> Result<Vec<Row>>;
    fn name(&self) -> &'static str;
}

/// In-process backend. Used when no web app is configured, and by tests.
#[derive(Default)]
pub struct MemorySheetStore {
    tables: Mutex<HashMap<Sheet, Vec<Row>>>,
}

impl MemorySheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a table (e.g. seen URLs from an earlier run).
    pub fn with_rows(self, sheet: Sheet, rows: Vec<Row>) -> Self {
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(sheet)
            .or_default()
            .extend(rows);
        self
    }

    pub fn rows(&self, sheet: Sheet) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&sheet)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl SheetStore for MemorySheetStore {
    async fn append(&self, sheet: Sheet, row: Row) -> Result<()> {
        self.tables
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?
            .entry(sheet)
            .or_default()
            .push(row);
        Ok(())
    }

    async fn read(&self, sheet: Sheet) -> Result<Vec<Row>> {
        Ok(self.rows(sheet))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

pub fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// --- row builders ---

/// `[ts, "system", title, message, "", "", "", "", "", "", "", 1.0, ""]`
pub fn event_row(ts: DateTime<Utc>, title: &str, message: &str) -> Row {
    let mut row = vec![json!(iso(ts)), json!("system"), json!(title), json!(message)];
    row.extend(std::iter::repeat(json!("")).take(7));
    row.push(json!(1.0));
    row.push(json!(""));
    row
}

pub fn discovery_row(ts: DateTime<Utc>, source_id: &str, source_name: &str, url: &str) -> Row {
    vec![json!(iso(ts)), json!(source_id), json!(source_name), json!(url)]
}

pub fn seen_row(url: &str, first_seen_at: DateTime<Utc>) -> Row {
    vec![json!(url), json!(iso(first_seen_at))]
}

pub fn failure_row(
    ts: DateTime<Utc>,
    kind: &str,
    source_id: &str,
    url: &str,
    message: &str,
) -> Row {
    vec![
        json!(iso(ts)),
        json!(kind),
        json!(source_id),
        json!(url),
        json!(message),
    ]
}

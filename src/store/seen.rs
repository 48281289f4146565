// src/store/seen.rs
//! Working seen-set: in-memory mirror of the `seen_urls` table.
//!
//! Loaded once at run start, then only grown. Writing the matching row to the
//! backend is the run context's job, so a failed write never desyncs the set.

use anyhow::Result;
use serde_json::Value;
use std::collections::HashSet;

use super::{Row, Sheet, SheetStore};

#[derive(Debug, Default, Clone)]
pub struct SeenStore {
    urls: HashSet<String>,
}

impl SeenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the `seen_urls` table into a fresh working set.
    pub async fn load(backend: &dyn SheetStore) -> Result<Self> {
        let rows = backend.read(Sheet::SeenUrls).await?;
        Ok(Self::from_rows(&rows))
    }

    /// First column is the URL; a header cell `url` is skipped.
    pub fn from_rows(rows: &[Row]) -> Self {
        let mut store = Self::new();
        for row in rows {
            let Some(url) = row.first().and_then(Value::as_str).map(str::trim) else {
                continue;
            };
            if url.is_empty() || url.eq_ignore_ascii_case("url") {
                continue;
            }
            store.urls.insert(url.to_string());
        }
        store
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url.trim())
    }

    /// Returns true when the URL was not yet in the set.
    pub fn mark_seen(&mut self, url: &str) -> bool {
        self.urls.insert(url.trim().to_string())
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

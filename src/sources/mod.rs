// src/sources/mod.rs
//! Source registry: the ordered list of municipal sites to monitor.
//!
//! Primary list is a structured file (`sources = [...]`, TOML or JSON). If it is
//! missing, unreadable or empty we fall back to a tabular CSV (`id,name,url`).
//! Both empty means "no sources"; the caller decides what that means.

pub mod discovery_config;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub use discovery_config::DiscoveryConfig;

pub const DEFAULT_SOURCES_PATH: &str = "config/sources.toml";
pub const DEFAULT_SOURCES_CSV_PATH: &str = "config/sources.csv";

/// How a source is discovered. Unknown strings are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceType {
    DedicatedPortal,
    Kortinfo,
    NewsFeed,
    MunicipalitySubsection,
    Minimal,
    Other(String),
}

impl SourceType {
    pub fn as_str(&self) -> &str {
        match self {
            SourceType::DedicatedPortal => "dedicated_portal",
            SourceType::Kortinfo => "kortinfo",
            SourceType::NewsFeed => "news_feed",
            SourceType::MunicipalitySubsection => "municipality_subsection",
            SourceType::Minimal => "minimal",
            SourceType::Other(raw) => raw.as_str(),
        }
    }
}

impl From<String> for SourceType {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dedicated_portal" => SourceType::DedicatedPortal,
            "kortinfo" => SourceType::Kortinfo,
            "news_feed" => SourceType::NewsFeed,
            "municipality_subsection" => SourceType::MunicipalitySubsection,
            "minimal" => SourceType::Minimal,
            _ => SourceType::Other(raw),
        }
    }
}

impl From<SourceType> for String {
    fn from(t: SourceType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured site/section to monitor. Immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    /// Defaults to the id when blank.
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(rename = "type", default = "default_source_type")]
    pub kind: SourceType,
    #[serde(default)]
    pub region: Option<String>,
}

fn default_source_type() -> SourceType {
    SourceType::MunicipalitySubsection
}

impl Source {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            kind: default_source_type(),
            region: None,
        }
    }

    pub fn with_kind(mut self, kind: SourceType) -> Self {
        self.kind = kind;
        self
    }

    pub fn discovery_config(&self) -> &'static DiscoveryConfig {
        DiscoveryConfig::for_type(&self.kind)
    }
}

/// Load sources: structured file first, CSV second. Never errors; an empty
/// vector means nothing could be resolved.
pub fn load_sources(primary: &Path, fallback: &Path) -> Vec<Source> {
    match load_sources_from(primary) {
        Ok(v) if !v.is_empty() => {
            info!(target: "sources", count = v.len(), path = %primary.display(), "sources loaded");
            return v;
        }
        Ok(_) => warn!(target: "sources", path = %primary.display(), "source list is empty"),
        Err(e) => warn!(target: "sources", path = %primary.display(), error = %format!("{e:#}"), "source list unavailable"),
    }

    match load_sources_csv(fallback) {
        Ok(v) => {
            if v.is_empty() {
                warn!(target: "sources", path = %fallback.display(), "tabular fallback is empty");
            } else {
                info!(target: "sources", count = v.len(), path = %fallback.display(), "sources loaded from tabular fallback");
            }
            v
        }
        Err(e) => {
            warn!(target: "sources", path = %fallback.display(), error = %format!("{e:#}"), "tabular fallback unavailable");
            Vec::new()
        }
    }
}

/// Load the structured list from an explicit path. Supports TOML or JSON.
pub fn load_sources_from(path: &Path) -> Result<Vec<Source>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

/// Load the CSV fallback (`id,name,url[,type[,region]]`, header skipped).
pub fn load_sources_csv(path: &Path) -> Result<Vec<Source>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading tabular sources from {}", path.display()))?;
    Ok(parse_sources_csv(&content))
}

#[derive(Deserialize)]
struct SourceList {
    #[serde(default)]
    sources: Vec<Source>,
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<Source>> {
    // JSON when hinted or when it looks like an object; TOML otherwise.
    let try_json = hint_ext == "json" || s.trim_start().starts_with('{');
    if try_json {
        if let Ok(v) = serde_json::from_str::<SourceList>(s) {
            return Ok(clean_sources(v.sources));
        }
    }
    match toml::from_str::<SourceList>(s) {
        Ok(v) => Ok(clean_sources(v.sources)),
        Err(toml_err) => {
            if !try_json {
                if let Ok(v) = serde_json::from_str::<SourceList>(s) {
                    return Ok(clean_sources(v.sources));
                }
            }
            Err(anyhow!("unsupported source list format: {toml_err}"))
        }
    }
}

fn parse_sources_csv(s: &str) -> Vec<Source> {
    let mut out = Vec::new();
    for (i, line) in s.lines().enumerate() {
        if i == 0 {
            continue; // header
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let cols = split_csv_line(line);
        let col = |n: usize| cols.get(n).map(|c| c.trim().to_string()).unwrap_or_default();
        let kind = match col(3) {
            t if t.is_empty() => default_source_type(),
            t => SourceType::from(t),
        };
        let region = Some(col(4)).filter(|r| !r.is_empty());
        out.push(Source {
            id: col(0),
            name: col(1),
            url: col(2),
            kind,
            region,
        });
    }
    clean_sources(out)
}

/// Split one CSV line, honouring double-quoted fields with `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut cols = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                cur.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => cols.push(std::mem::take(&mut cur)),
            _ => cur.push(c),
        }
    }
    cols.push(cur);
    cols
}

/// Trim fields and drop entries without id or url. Order is preserved.
fn clean_sources(items: Vec<Source>) -> Vec<Source> {
    items
        .into_iter()
        .filter_map(|mut s| {
            s.id = s.id.trim().to_string();
            s.url = s.url.trim().to_string();
            s.name = s.name.trim().to_string();
            if s.id.is_empty() || s.url.is_empty() {
                warn!(target: "sources", id = %s.id, "dropping source without id or url");
                return None;
            }
            if s.name.is_empty() {
                s.name = s.id.clone();
            }
            Some(s)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_LIST: &str = r#"
[[sources]]
id = "aarhus"
name = "Aarhus Grundsalg"
url = "https://grundsalg.aarhus.dk/"
type = "dedicated_portal"
region = "Midtjylland"

[[sources]]
id = "odense"
name = "Odense"
url = "https://grundsalg.kortinfo.net/odense-grundsalg/"
type = "kortinfo"

[[sources]]
id = "weird"
name = "Weird"
url = "https://x.dk/"
type = "rss_something"
"#;

    #[test]
    fn toml_list_keeps_order_and_types() {
        let v = parse_sources(TOML_LIST, "toml").unwrap();
        let ids: Vec<_> = v.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["aarhus", "odense", "weird"]);
        assert_eq!(v[0].kind, SourceType::DedicatedPortal);
        assert_eq!(v[0].region.as_deref(), Some("Midtjylland"));
        assert_eq!(v[1].kind, SourceType::Kortinfo);
        assert_eq!(v[2].kind, SourceType::Other("rss_something".into()));
    }

    #[test]
    fn json_list_is_accepted() {
        let json = r#"{"sources":[{"id":"a","name":"A","url":"https://a.dk/","type":"minimal"}]}"#;
        let v = parse_sources(json, "json").unwrap();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].kind, SourceType::Minimal);
    }

    #[test]
    fn csv_skips_header_and_quotes() {
        let csv = "id,name,url\n\
                   a,\"Kommune, Syd\",https://a.dk/\n\
                   \n\
                   # comment\n\
                   b,B,https://b.dk/,minimal,Sjælland\n\
                   ,missing id,https://c.dk/\n";
        let v = parse_sources_csv(csv);
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].name, "Kommune, Syd");
        assert_eq!(v[0].kind, SourceType::MunicipalitySubsection);
        assert_eq!(v[1].kind, SourceType::Minimal);
        assert_eq!(v[1].region.as_deref(), Some("Sjælland"));
    }

    #[test]
    fn source_type_round_trips_through_string() {
        let t = SourceType::from("News_Feed".to_string());
        assert_eq!(t, SourceType::NewsFeed);
        assert_eq!(String::from(t), "news_feed");
    }
}

// src/discovery/mod.rs
//! Candidate URL discovery, one strategy per source type.
//!
//! - `Minimal`: the source URL itself, no network call.
//! - `RenderedLinks`: scrape the (client-side rendered) page and mine its links.
//! - `SiteMap`: a single map/search call with the type's keywords.
//!
//! All strategies share the same final filter (scheme, document extensions,
//! seen-set, duplicates) and the per-source cap. The run-wide cap lives in
//! [`DiscoveryBudget`] and is enforced by the orchestrator.

use std::collections::HashSet;

use tracing::{debug, info};
use url::Url;

use crate::scrape::{FetchError, Format, MapOptions, RateLimitedClient, Scraper};
use crate::sources::{Source, SourceType};
use crate::store::SeenStore;

pub const DEFAULT_PER_SOURCE_MAX: usize = 25;
pub const DEFAULT_GLOBAL_MAX: usize = 150;

/// Path fragments that mark a link as property related (rendered-link sites).
pub const PROPERTY_PATH_HINTS: &[&str] = &["grund", "parcel", "erhverv", "bolig", "salg", "udbud"];

/// Linked documents we never analyse as pages.
pub const DOCUMENT_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".jpg", ".jpeg", ".png",
    ".gif",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Minimal,
    RenderedLinks,
    SiteMap,
}

impl Strategy {
    pub fn for_type(kind: &SourceType) -> Self {
        match kind {
            SourceType::Minimal => Strategy::Minimal,
            SourceType::Kortinfo => Strategy::RenderedLinks,
            _ => Strategy::SiteMap,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("invalid base url {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

pub struct DiscoveryEngine<'a, S: Scraper> {
    client: &'a RateLimitedClient<S>,
    per_source_max: usize,
}

impl<'a, S: Scraper> DiscoveryEngine<'a, S> {
    pub fn new(client: &'a RateLimitedClient<S>, per_source_max: usize) -> Self {
        Self {
            client,
            per_source_max,
        }
    }

    /// Ordered, filtered, capped candidate URLs for one source.
    pub async fn discover(
        &self,
        source: &Source,
        seen: &SeenStore,
    ) -> Result<Vec<String>, DiscoveryError> {
        let strategy = Strategy::for_type(&source.kind);
        debug!(target: "discovery", source = %source.id, ?strategy, "discovering");

        let urls = match strategy {
            Strategy::Minimal => {
                let url = source.url.trim();
                let mut urls = if seen.contains(url) {
                    Vec::new()
                } else {
                    vec![url.to_string()]
                };
                urls.truncate(self.per_source_max);
                urls
            }
            Strategy::RenderedLinks => {
                let base = parse_base(source)?;
                let page = self
                    .client
                    .scrape(source.url.as_str(), &[Format::Markdown, Format::Links])
                    .await?;
                let links = page.links.unwrap_or_default();
                let candidates = select_property_links(&base, &links);
                finalize(&base, candidates, seen, self.per_source_max)
            }
            Strategy::SiteMap => {
                let base = parse_base(source)?;
                let cfg = source.discovery_config();
                let options = MapOptions {
                    search: cfg.search_query(),
                    limit: cfg.result_limit,
                };
                let links = self.client.map(source.url.as_str(), &options).await?;
                finalize(&base, links, seen, self.per_source_max)
            }
        };

        info!(
            target: "discovery",
            source = %source.id,
            kind = %source.kind,
            found = urls.len(),
            "source discovered"
        );
        Ok(urls)
    }
}

fn parse_base(source: &Source) -> Result<Url, DiscoveryError> {
    Url::parse(source.url.trim()).map_err(|e| DiscoveryError::InvalidBaseUrl {
        url: source.url.clone(),
        reason: e.to_string(),
    })
}

/// Links whose path matches a property hint; if none do, every same-host
/// link. The base page itself is never a candidate.
pub fn select_property_links(base: &Url, links: &[String]) -> Vec<String> {
    let resolved: Vec<Url> = links
        .iter()
        .filter_map(|l| base.join(l.trim()).ok())
        .filter(|u| !same_page(u, base))
        .collect();

    let matching: Vec<String> = resolved
        .iter()
        .filter(|u| {
            let tail = url_tail(u).to_lowercase();
            PROPERTY_PATH_HINTS.iter().any(|h| tail.contains(h))
        })
        .map(Url::to_string)
        .collect();
    if !matching.is_empty() {
        return matching;
    }

    resolved
        .iter()
        .filter(|u| u.host_str() == base.host_str())
        .map(Url::to_string)
        .collect()
}

/// Shared tail filter: http(s) only, no documents, not seen, no repeats,
/// then the per-source cap (earliest first).
pub fn finalize(base: &Url, candidates: Vec<String>, seen: &SeenStore, cap: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut dup: HashSet<String> = HashSet::new();
    for raw in candidates {
        let Ok(u) = base.join(raw.trim()) else {
            continue;
        };
        if !matches!(u.scheme(), "http" | "https") || is_document_url(&u) {
            continue;
        }
        let s = u.to_string();
        if seen.contains(&s) || !dup.insert(s.clone()) {
            continue;
        }
        if out.len() >= cap {
            break;
        }
        out.push(s);
    }
    out
}

pub fn is_document_url(u: &Url) -> bool {
    let path = u.path().to_ascii_lowercase();
    DOCUMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Path + query + fragment; the host is excluded so site names like
/// `grundsalg.example.dk` do not match every link.
fn url_tail(u: &Url) -> String {
    let mut s = u.path().to_string();
    if let Some(q) = u.query() {
        s.push('?');
        s.push_str(q);
    }
    if let Some(f) = u.fragment() {
        s.push('#');
        s.push_str(f);
    }
    s
}

fn same_page(a: &Url, b: &Url) -> bool {
    fn key(u: &Url) -> String {
        let mut u = u.clone();
        u.set_fragment(None);
        u.to_string().trim_end_matches('/').to_string()
    }
    a.fragment().is_none() && key(a) == key(b)
}

/// Run-wide discovery cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryBudget {
    cap: usize,
    used: usize,
}

impl DiscoveryBudget {
    pub fn new(cap: usize) -> Self {
        Self { cap, used: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Take as many URLs as the budget allows, in order.
    pub fn admit(&mut self, mut urls: Vec<String>) -> Vec<String> {
        urls.truncate(self.remaining());
        self.used += urls.len();
        urls
    }
}

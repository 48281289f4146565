// src/scrape/mod.rs
pub mod firecrawl;
pub mod retry;

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

pub use firecrawl::FirecrawlScraper;
pub use retry::{FetchError, RateLimitedClient, RetryPolicy};

/// Output formats requested from a scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Markdown,
    Links,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapedPage {
    pub markdown: Option<String>,
    pub links: Option<Vec<String>>,
}

impl ScrapedPage {
    /// Markdown if present and not blank.
    pub fn content(&self) -> Option<&str> {
        self.markdown.as_deref().filter(|m| !m.trim().is_empty())
    }
}

/// Options for a site-map / search call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapOptions {
    pub search: Option<String>,
    pub limit: usize,
}

/// Scraping collaborator. Implementations do a single attempt; retry and
/// pacing live in [`RateLimitedClient`].
#[async_trait::async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, url: &str, formats: &[Format]) -> Result<ScrapedPage>;
    async fn map(&self, url: &str, options: &MapOptions) -> Result<Vec<String>>;
    fn name(&self) -> &'static str;
}

#[async_trait::async_trait]
impl<T: Scraper + ?Sized> Scraper for Arc<T> {
    async fn scrape(&self, url: &str, formats: &[Format]) -> Result<ScrapedPage> {
        (**self).scrape(url, formats).await
    }

    async fn map(&self, url: &str, options: &MapOptions) -> Result<Vec<String>> {
        (**self).map(url, options).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

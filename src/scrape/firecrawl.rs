// src/scrape/firecrawl.rs
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Format, MapOptions, ScrapedPage, Scraper};

pub const DEFAULT_FIRECRAWL_URL: &str = "https://api.firecrawl.dev";

/// Firecrawl REST client (`/v1/scrape`, `/v1/map`). Requires an API key.
pub struct FirecrawlScraper {
    http: Client,
    api_key: String,
    base_url: String,
}

impl FirecrawlScraper {
    pub fn new(api_key: String, base_url: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent("grundsalg-monitor/0.1")
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(90))
            .build()
            .context("building firecrawl http client")?;
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_FIRECRAWL_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            http,
            api_key,
            base_url,
        })
    }

    /// `FIRECRAWL_API_KEY` (required) and `FIRECRAWL_API_URL` (optional).
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("FIRECRAWL_API_KEY")
            .map_err(|_| anyhow!("Missing FIRECRAWL_API_KEY env var"))?;
        let base_url = std::env::var("FIRECRAWL_API_URL")
            .ok()
            .filter(|u| !u.trim().is_empty());
        Self::new(api_key, base_url)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("firecrawl {path} request"))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "firecrawl {path} HTTP {status}: {}",
                text.chars().take(200).collect::<String>()
            ));
        }
        Ok(resp)
    }
}

#[derive(Serialize)]
struct ScrapeReq<'a> {
    url: &'a str,
    formats: &'a [Format],
}

#[derive(Deserialize)]
struct ScrapeResp {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<ScrapeData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    links: Option<Vec<String>>,
}

#[derive(Serialize)]
struct MapReq<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a str>,
    limit: usize,
}

/// Map responses come as a bare list or wrapped in `{links: [...]}`, with
/// links as strings or `{url}` objects depending on API version.
#[derive(Deserialize)]
#[serde(untagged)]
enum MapResp {
    Bare(Vec<MapLink>),
    Wrapped {
        #[serde(default)]
        success: Option<bool>,
        #[serde(default)]
        links: Vec<MapLink>,
        #[serde(default)]
        error: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MapLink {
    Url(String),
    Object { url: String },
}

impl MapLink {
    fn into_url(self) -> String {
        match self {
            MapLink::Url(u) => u,
            MapLink::Object { url } => url,
        }
    }
}

pub(crate) fn parse_map_body(body: &str) -> Result<Vec<String>> {
    let parsed: MapResp = serde_json::from_str(body).context("parsing map response")?;
    let links = match parsed {
        MapResp::Bare(links) => links,
        MapResp::Wrapped {
            success: Some(false),
            error,
            ..
        } => {
            return Err(anyhow!(
                "map failed: {}",
                error.unwrap_or_else(|| "unknown error".into())
            ))
        }
        MapResp::Wrapped { links, .. } => links,
    };
    Ok(links.into_iter().map(MapLink::into_url).collect())
}

#[async_trait::async_trait]
impl Scraper for FirecrawlScraper {
    async fn scrape(&self, url: &str, formats: &[Format]) -> Result<ScrapedPage> {
        let resp: ScrapeResp = self
            .post("/v1/scrape", &ScrapeReq { url, formats })
            .await?
            .json()
            .await
            .context("parsing scrape response")?;
        if !resp.success {
            return Err(anyhow!(
                "scrape failed: {}",
                resp.error.unwrap_or_else(|| "unknown error".into())
            ));
        }
        let data = resp.data.ok_or_else(|| anyhow!("scrape returned no data"))?;
        Ok(ScrapedPage {
            markdown: data.markdown,
            links: data.links,
        })
    }

    async fn map(&self, url: &str, options: &MapOptions) -> Result<Vec<String>> {
        let req = MapReq {
            url,
            search: options.search.as_deref(),
            limit: options.limit,
        };
        let body = self
            .post("/v1/map", &req)
            .await?
            .text()
            .await
            .context("reading map response")?;
        parse_map_body(&body)
    }

    fn name(&self) -> &'static str {
        "firecrawl"
    }
}

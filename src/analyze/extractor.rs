// src/analyze/extractor.rs
//! Structured listing extraction from a relevant page.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ai_adapter::DynModel;
use super::text::{extract_json_object, normalize_content};

/// Max chars of page content sent to the model.
pub const EXTRACT_CONTENT_CHARS: usize = 12_000;

/// Accepted date layouts, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%Y"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedListing {
    pub title: Option<String>,
    pub municipality: Option<String>,
    pub summary: Option<String>,
    pub confidence: f64,
    pub published_date: Option<NaiveDate>,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("model call failed for {url}: {message}")]
    Model { url: String, message: String },
    #[error("unparsable extraction for {url}: {message}")]
    Parse { url: String, message: String },
}

#[derive(Debug, Deserialize)]
struct RawListing {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    municipality: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    published_date: Option<String>,
}

pub const EXTRACT_SYSTEM_PROMPT: &str = "Du udtrækker oplysninger om kommunalt salg af \
grunde og ejendomme fra danske websider. Svar kun med JSON: \
{\"title\": string|null, \"municipality\": string|null, \
\"summary\": kort resumé|null, \"confidence\": tal mellem 0 og 1, \
\"published_date\": \"YYYY-MM-DD\"|null}. Opfind ikke oplysninger; \
brug null når noget ikke fremgår af siden.";

pub struct Extractor {
    model: DynModel,
}

impl Extractor {
    pub fn new(model: DynModel) -> Self {
        Self { model }
    }

    pub async fn extract(&self, url: &str, content: &str) -> Result<ExtractedListing, ExtractionError> {
        let body = normalize_content(content, EXTRACT_CONTENT_CHARS);
        let user = format!("URL: {url}\n\nIndhold:\n{body}");

        let raw = self
            .model
            .complete_json(EXTRACT_SYSTEM_PROMPT, &user)
            .await
            .map_err(|e| ExtractionError::Model {
                url: url.to_string(),
                message: format!("{e:#}"),
            })?;

        let listing = parse_listing(url, &raw)?;
        debug!(
            target: "analysis",
            %url,
            confidence = listing.confidence,
            has_title = listing.title.is_some(),
            "extracted listing"
        );
        Ok(listing)
    }
}

fn parse_listing(url: &str, raw: &str) -> Result<ExtractedListing, ExtractionError> {
    let parse_err = |message: String| ExtractionError::Parse {
        url: url.to_string(),
        message,
    };
    let json = extract_json_object(raw).ok_or_else(|| parse_err("no JSON object in model reply".into()))?;
    let r: RawListing = serde_json::from_str(json).map_err(|e| parse_err(e.to_string()))?;

    let confidence = r
        .confidence
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(0.0);

    Ok(ExtractedListing {
        title: non_empty(r.title),
        municipality: non_empty(r.municipality),
        summary: non_empty(r.summary),
        confidence,
        published_date: r.published_date.as_deref().and_then(parse_date),
        url: url.to_string(),
    })
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Lenient date parse; unknown layouts are `None`, never guessed.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
}

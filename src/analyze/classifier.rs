// src/analyze/classifier.rs
//! Three-tier relevance cascade: strong keywords, boilerplate negatives,
//! then the language model. First tier that decides wins.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ai_adapter::{sanitize_reason, DynModel};
use super::text::{extract_json_object, normalize_content, truncate_chars};

/// Max chars of page content sent to the model.
pub const CLASSIFY_CONTENT_CHARS: usize = 6_000;
/// Only the head of a page is checked for boilerplate.
pub const NEGATIVE_WINDOW_CHARS: usize = 500;
pub const DEFAULT_FAIL_OPEN_CONFIDENCE: f64 = 0.25;
pub const TRUSTED_SOURCE_CONFIDENCE: f64 = 0.9;

/// Strong Danish land/property-sale terms (lower case).
pub const SALE_KEYWORDS: &[&str] = &[
    "byggegrunde",
    "grundsalg",
    "storparceller",
    "parcelhusgrunde",
    "erhvervsgrunde",
    "boliggrunde",
    "udbud af grund",
    "salg af grund",
    "salg af ejendom",
    "ejendom til salg",
    "grund til salg",
    "købstilbud",
    "udbudsmateriale",
    "salgsvilkår",
];

/// Administrative boilerplate (lower case).
pub const BOILERPLATE_TERMS: &[&str] = &[
    "kontakt os",
    "cookiepolitik",
    "cookie-politik",
    "privatlivspolitik",
    "persondatapolitik",
    "sitemap",
    "tilgængelighedserklæring",
    "log ind",
    "om hjemmesiden",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    KeywordMatch,
    Boilerplate,
    LandSale,
    PropertySale,
    Tender,
    NotRelevant,
    TrustedSource,
    ModelFallback,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::KeywordMatch => "keyword_match",
            Category::Boilerplate => "boilerplate",
            Category::LandSale => "land_sale",
            Category::PropertySale => "property_sale",
            Category::Tender => "tender",
            Category::NotRelevant => "not_relevant",
            Category::TrustedSource => "trusted_source",
            Category::ModelFallback => "model_fallback",
        }
    }

    /// Categories the model may answer with.
    fn from_model(raw: &str, is_relevant: bool) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "land_sale" => Category::LandSale,
            "property_sale" => Category::PropertySale,
            "tender" => Category::Tender,
            "not_relevant" => Category::NotRelevant,
            _ if is_relevant => Category::PropertySale,
            _ => Category::NotRelevant,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub is_relevant: bool,
    pub confidence: f64,
    pub category: Category,
    pub reason: String,
}

impl Classification {
    /// Verdict for dedicated sales channels that skip classification.
    pub fn trusted_source() -> Self {
        Self {
            is_relevant: true,
            confidence: TRUSTED_SOURCE_CONFIDENCE,
            category: Category::TrustedSource,
            reason: "dedicated sales source".to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.category == Category::ModelFallback
    }
}

/// What to do when the model tier cannot answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelFailurePolicy {
    /// Keep the URL in the pipeline with a low-confidence relevant verdict.
    FailOpen { confidence: f64 },
    FailClosed,
}

impl Default for ModelFailurePolicy {
    fn default() -> Self {
        ModelFailurePolicy::FailOpen {
            confidence: DEFAULT_FAIL_OPEN_CONFIDENCE,
        }
    }
}

impl ModelFailurePolicy {
    /// `open` / `closed`; anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" | "fail_open" => Some(Self::default()),
            "closed" | "fail_closed" => Some(ModelFailurePolicy::FailClosed),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("classification failed for {url}: {message}")]
pub struct ClassificationError {
    pub url: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ModelVerdict {
    is_relevant: bool,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    category: String,
    #[serde(default)]
    reason: String,
}

pub const CLASSIFY_SYSTEM_PROMPT: &str = "Du vurderer danske kommunale websider. \
Afgør om siden annoncerer salg af kommunal jord, byggegrunde eller ejendom, \
eller et udbud af sådanne. Svar kun med JSON: \
{\"is_relevant\": bool, \"confidence\": tal mellem 0 og 1, \
\"category\": \"land_sale\"|\"property_sale\"|\"tender\"|\"not_relevant\", \
\"reason\": kort begrundelse}";

pub struct Classifier {
    model: DynModel,
    policy: ModelFailurePolicy,
}

impl Classifier {
    pub fn new(model: DynModel, policy: ModelFailurePolicy) -> Self {
        Self { model, policy }
    }

    pub async fn classify(
        &self,
        url: &str,
        content: &str,
    ) -> Result<Classification, ClassificationError> {
        let lower = content.to_lowercase();

        // 1) keyword tier
        if let Some(c) = keyword_tier(&lower) {
            debug!(target: "analysis", %url, confidence = c.confidence, "keyword tier");
            return Ok(c);
        }

        // 2) negative tier
        if let Some(c) = negative_tier(&lower) {
            debug!(target: "analysis", %url, reason = %c.reason, "negative tier");
            return Ok(c);
        }

        // 3) model tier
        match self.ask_model(url, content).await {
            Ok(c) => Ok(c),
            Err(message) => match self.policy {
                ModelFailurePolicy::FailOpen { confidence } => {
                    warn!(target: "analysis", %url, error = %message, "model tier failed, failing open");
                    Ok(Classification {
                        is_relevant: true,
                        confidence: confidence.clamp(0.0, 1.0),
                        category: Category::ModelFallback,
                        reason: sanitize_reason(&format!("model unavailable: {message}"), 200),
                    })
                }
                ModelFailurePolicy::FailClosed => Err(ClassificationError {
                    url: url.to_string(),
                    message,
                }),
            },
        }
    }

    async fn ask_model(&self, url: &str, content: &str) -> Result<Classification, String> {
        let body = normalize_content(content, CLASSIFY_CONTENT_CHARS);
        let user = format!("URL: {url}\n\nIndhold:\n{body}");
        let raw = self
            .model
            .complete_json(CLASSIFY_SYSTEM_PROMPT, &user)
            .await
            .map_err(|e| format!("{e:#}"))?;
        parse_verdict(&raw)
    }
}

fn keyword_tier(lower: &str) -> Option<Classification> {
    let matched: Vec<&str> = SALE_KEYWORDS
        .iter()
        .copied()
        .filter(|k| lower.contains(k))
        .collect();
    if matched.is_empty() {
        return None;
    }
    let confidence = (0.5 + 0.1 * matched.len() as f64).min(0.95);
    let shown: Vec<&str> = matched.iter().copied().take(3).collect();
    Some(Classification {
        is_relevant: true,
        confidence,
        category: Category::KeywordMatch,
        reason: format!("matched keywords: {}", shown.join(", ")),
    })
}

fn negative_tier(lower: &str) -> Option<Classification> {
    let head = truncate_chars(lower, NEGATIVE_WINDOW_CHARS);
    let term = BOILERPLATE_TERMS.iter().find(|t| head.contains(*t))?;
    Some(Classification {
        is_relevant: false,
        confidence: 0.0,
        category: Category::Boilerplate,
        reason: format!("boilerplate page: {term}"),
    })
}

fn parse_verdict(raw: &str) -> Result<Classification, String> {
    let json = extract_json_object(raw).ok_or_else(|| "no JSON object in model reply".to_string())?;
    let v: ModelVerdict =
        serde_json::from_str(json).map_err(|e| format!("invalid model JSON: {e}"))?;
    let confidence = if v.confidence.is_finite() {
        v.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };
    Ok(Classification {
        is_relevant: v.is_relevant,
        confidence,
        category: Category::from_model(&v.category, v.is_relevant),
        reason: sanitize_reason(&v.reason, 200),
    })
}

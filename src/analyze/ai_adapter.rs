//! AI adapter: provider abstraction for the structured (JSON) prompts used by
//! classification and extraction.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ai::AiConfig;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Language-model collaborator. Returns the raw reply; callers parse it.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete_json(&self, system: &str, user: &str) -> Result<String>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynModel = Arc<dyn LanguageModel>;

/// Factory: build a model according to config.
///
/// * `enabled == false` or missing key → [`DisabledModel`].
/// * `provider == "openai"` → [`OpenAiProvider`].
/// * anything else → disabled, with a warning.
pub fn build_model_from_config(config: &AiConfig) -> DynModel {
    if !config.enabled {
        info!(target: "analysis", "AI disabled in config; model tier will fall back");
        return Arc::new(DisabledModel);
    }
    match config.provider.as_str() {
        "openai" if !config.api_key.is_empty() => {
            match OpenAiProvider::new(config.api_key.clone(), config.model.as_deref()) {
                Ok(p) => Arc::new(p),
                Err(e) => {
                    warn!(target: "analysis", error = %format!("{e:#}"), "openai client init failed");
                    Arc::new(DisabledModel)
                }
            }
        }
        other => {
            warn!(target: "analysis", provider = other, "unsupported or unconfigured AI provider");
            Arc::new(DisabledModel)
        }
    }
}

// ------------------------------------------------------------
// Concrete providers
// ------------------------------------------------------------

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// OpenAI provider (Chat Completions API, JSON response format).
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiProvider {
    /// `model_override`: pass Some("gpt-4o") to override; defaults to gpt-4o-mini.
    pub fn new(api_key: String, model_override: Option<&str>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("grundsalg-monitor/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()
            .context("building openai http client")?;
        Ok(Self {
            http,
            api_key,
            model: model_override.unwrap_or(DEFAULT_OPENAI_MODEL).to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
        })
    }

    /// Point at an OpenAI-compatible endpoint (proxies, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait::async_trait]
impl LanguageModel for OpenAiProvider {
    async fn complete_json(&self, system: &str, user: &str) -> Result<String> {
        let req = ChatReq {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("openai request")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("openai HTTP {status}");
        }
        let body: ChatResp = resp.json().await.context("openai response body")?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| anyhow!("openai returned no content"))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Always errors; used when AI is disabled so the classifier's failure
/// policy decides the outcome.
pub struct DisabledModel;

#[async_trait::async_trait]
impl LanguageModel for DisabledModel {
    async fn complete_json(&self, _system: &str, _user: &str) -> Result<String> {
        Err(anyhow!("language model disabled"))
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

// ------------------------------------------------------------
// Sanitization
// ------------------------------------------------------------

/// Single line, whitespace collapsed, at most `max` chars. Keeps non-ASCII
/// letters (Danish text).
pub fn sanitize_reason(input: &str, max: usize) -> String {
    let mut out = String::with_capacity(max.min(256));
    let mut prev_space = false;
    let mut count = 0usize;
    for ch in input.chars() {
        let c = if ch.is_whitespace() || ch.is_control() {
            ' '
        } else {
            ch
        };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
                count += 1;
            }
            prev_space = true;
        } else {
            out.push(c);
            count += 1;
            prev_space = false;
        }
        if count >= max {
            break;
        }
    }
    out.trim().to_string()
}

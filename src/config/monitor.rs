// src/config/monitor.rs
//! Run settings from the environment. Unset means default; unparsable values
//! fall back to the default with a warning.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::analyze::ModelFailurePolicy;
use crate::config::ai::DEFAULT_AI_CONFIG_PATH;
use crate::discovery::{DEFAULT_GLOBAL_MAX, DEFAULT_PER_SOURCE_MAX};
use crate::scrape::RetryPolicy;
use crate::sources::{DEFAULT_SOURCES_CSV_PATH, DEFAULT_SOURCES_PATH};

pub const DEFAULT_MIN_PROPOSAL_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub sources_path: PathBuf,
    pub sources_csv_path: PathBuf,
    pub retry: RetryPolicy,
    pub per_source_max: usize,
    pub global_max: usize,
    pub min_proposal_confidence: f64,
    pub failure_policy: ModelFailurePolicy,
    pub ai_config_path: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sources_path: PathBuf::from(DEFAULT_SOURCES_PATH),
            sources_csv_path: PathBuf::from(DEFAULT_SOURCES_CSV_PATH),
            retry: RetryPolicy::default(),
            per_source_max: DEFAULT_PER_SOURCE_MAX,
            global_max: DEFAULT_GLOBAL_MAX,
            min_proposal_confidence: DEFAULT_MIN_PROPOSAL_CONFIDENCE,
            failure_policy: ModelFailurePolicy::default(),
            ai_config_path: PathBuf::from(DEFAULT_AI_CONFIG_PATH),
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let secs = |k: &str, def: Duration| {
            parsed::<u64>(k, get(k)).map(Duration::from_secs).unwrap_or(def)
        };

        let failure_policy = match get("CLASSIFIER_FAILURE_POLICY") {
            None => d.failure_policy,
            Some(raw) => ModelFailurePolicy::parse(&raw).unwrap_or_else(|| {
                warn!(key = "CLASSIFIER_FAILURE_POLICY", value = %raw, "unknown policy, using fail-open");
                d.failure_policy
            }),
        };

        let min_conf = parsed::<f64>("MIN_PROPOSAL_CONFIDENCE", get("MIN_PROPOSAL_CONFIDENCE"))
            .filter(|c| (0.0..=1.0).contains(c))
            .unwrap_or(d.min_proposal_confidence);

        Self {
            sources_path: get("SOURCES_PATH").map(PathBuf::from).unwrap_or(d.sources_path),
            sources_csv_path: get("SOURCES_CSV_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.sources_csv_path),
            retry: RetryPolicy {
                request_delay: secs("REQUEST_DELAY_SECS", d.retry.request_delay),
                max_retries: parsed("MAX_RETRIES", get("MAX_RETRIES")).unwrap_or(d.retry.max_retries),
                retry_delay: secs("RETRY_DELAY_SECS", d.retry.retry_delay),
            },
            per_source_max: parsed("PER_SOURCE_MAX_URLS", get("PER_SOURCE_MAX_URLS"))
                .unwrap_or(d.per_source_max),
            global_max: parsed("GLOBAL_MAX_URLS", get("GLOBAL_MAX_URLS")).unwrap_or(d.global_max),
            min_proposal_confidence: min_conf,
            failure_policy,
            ai_config_path: get("AI_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.ai_config_path),
        }
    }
}

fn parsed<T: FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "unparsable setting, using default");
            None
        }
    }
}

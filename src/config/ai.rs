// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};
use tracing::warn;

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" (case-insensitive)
    pub provider: String,
    /// Optional model override, e.g. "gpt-4o".
    #[serde(default)]
    pub model: Option<String>,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default)]
    pub api_key: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            model: None,
            api_key: String::new(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: AiConfig = serde_json::from_str(&data)?;

        // Normalize provider
        cfg.provider = cfg.provider.trim().to_lowercase();

        // Resolve api key if "ENV"
        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "openai" => env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?,
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        if cfg.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            cfg.model = None;
        }

        Ok(cfg)
    }

    /// Like `load_from_file`, but a missing or broken file means "AI disabled".
    pub fn load_or_disabled<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %format!("{e:#}"), "AI config unavailable, AI disabled");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn env_key_is_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ai.json");
        fs::write(
            &p,
            r#"{"enabled":true,"provider":"OpenAI","model":"","api_key":"ENV"}"#,
        )
        .unwrap();

        env::set_var("OPENAI_API_KEY", "sk-from-env");
        let cfg = AiConfig::load_from_file(&p).unwrap();
        env::remove_var("OPENAI_API_KEY");

        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.api_key, "sk-from-env");
        assert!(cfg.model.is_none());
    }

    #[test]
    fn missing_file_disables_ai() {
        let cfg = AiConfig::load_or_disabled("does/not/exist.json");
        assert!(!cfg.enabled);
    }
}

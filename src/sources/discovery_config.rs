// src/sources/discovery_config.rs
use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::SourceType;

/// Static per-type discovery settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    /// Limit passed to the site-map call.
    pub result_limit: usize,
    pub search_keywords: Vec<&'static str>,
    /// False for dedicated sales channels: classification is bypassed.
    pub classify_before_extract: bool,
}

impl DiscoveryConfig {
    /// Lookup by type; unknown types use the `municipality_subsection` entry.
    pub fn for_type(kind: &SourceType) -> &'static DiscoveryConfig {
        let key = match kind {
            SourceType::Other(_) => "municipality_subsection",
            known => known.as_str(),
        };
        TABLE.get(key).unwrap_or(&*FALLBACK)
    }

    /// Keywords joined for the `search` parameter of a map call.
    pub fn search_query(&self) -> Option<String> {
        if self.search_keywords.is_empty() {
            None
        } else {
            Some(self.search_keywords.join(" "))
        }
    }
}

static FALLBACK: Lazy<DiscoveryConfig> = Lazy::new(|| DiscoveryConfig {
    result_limit: 25,
    search_keywords: vec!["grundsalg", "byggegrunde", "salg af grunde"],
    classify_before_extract: true,
});

static TABLE: Lazy<HashMap<&'static str, DiscoveryConfig>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "dedicated_portal",
        DiscoveryConfig {
            result_limit: 50,
            search_keywords: vec!["grundsalg", "byggegrund", "storparcel"],
            classify_before_extract: false,
        },
    );
    m.insert(
        "kortinfo",
        DiscoveryConfig {
            result_limit: 50,
            search_keywords: vec!["grundsalg"],
            classify_before_extract: false,
        },
    );
    m.insert(
        "news_feed",
        DiscoveryConfig {
            result_limit: 30,
            search_keywords: vec!["grund", "salg", "udbud", "ejendom"],
            classify_before_extract: true,
        },
    );
    m.insert("municipality_subsection", FALLBACK.clone());
    m.insert(
        "minimal",
        DiscoveryConfig {
            result_limit: 1,
            search_keywords: Vec::new(),
            classify_before_extract: true,
        },
    );
    m
});

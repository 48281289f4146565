// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod config;
pub mod discovery;
pub mod notify;
pub mod pipeline;
pub mod scrape;
pub mod sources;
pub mod store;
pub mod testing;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

pub use crate::config::{AiConfig, MonitorConfig};
pub use crate::pipeline::{Monitor, RunOutcome, RunReport};

use crate::analyze::build_model_from_config;
use crate::notify::{DisabledNotifier, Notifier, WebhookNotifier};
use crate::scrape::{FirecrawlScraper, Scraper};
use crate::store::{MemorySheetStore, SheetStore, SheetsWebApp};

/// Default `EnvFilter` directive when `RUST_LOG` is unset. Lists every custom
/// log target so their info events survive the trailing `warn`.
pub const DEFAULT_LOG_FILTER: &str =
    "grundsalg_monitor=info,sources=info,discovery=info,scrape=info,analysis=info,store=info,notify=info,warn";

/// Wire the production collaborators from the environment.
///
/// The scraping service key is required. A missing spreadsheet endpoint falls
/// back to an in-memory store (nothing survives the process), a missing
/// webhook disables notifications, and a missing AI config disables the model
/// tier.
pub fn build_monitor_from_env() -> Result<Monitor> {
    let config = MonitorConfig::from_env();

    let scraper: Arc<dyn Scraper> = Arc::new(FirecrawlScraper::from_env()?);

    let ai = AiConfig::load_or_disabled(&config.ai_config_path);
    let model = build_model_from_config(&ai);

    let store: Arc<dyn SheetStore> = match SheetsWebApp::from_env() {
        Some(s) => Arc::new(s),
        None => {
            warn!(target: "store", "SHEETS_WEBAPP_URL not set, using in-memory store; seen URLs will not persist");
            Arc::new(MemorySheetStore::new())
        }
    };

    let notifier: Arc<dyn Notifier> = match WebhookNotifier::from_env() {
        Some(n) => Arc::new(n),
        None => Arc::new(DisabledNotifier),
    };

    info!(
        scraper = scraper.name(),
        model = model.provider_name(),
        store = store.name(),
        notifier = notifier.name(),
        "collaborators ready"
    );
    Ok(Monitor::new(scraper, model, store, notifier, config))
}

// src/pipeline/mod.rs
//! Run orchestrator: discovery phase, analysis phase, summary phase.
//!
//! Every URL that enters analysis reaches a terminal state and is marked seen
//! exactly once, whatever happened to it. No per-source or per-URL error
//! aborts the run.

pub mod stats;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::analyze::{Category, Classification, Classifier, DynModel, ExtractedListing, Extractor};
use crate::config::MonitorConfig;
use crate::discovery::{DiscoveryBudget, DiscoveryEngine};
use crate::notify::{format_notification, Notifier};
use crate::scrape::{Format, RateLimitedClient, Scraper};
use crate::sources::{load_sources, Source};
use crate::store::{
    discovery_row, event_row, failure_row, iso, seen_row, Row, SeenStore, Sheet, SheetStore,
};

pub use stats::{FailureKind, FailureRecord, RunStats};

pub const RUN_EVENT_TITLE: &str = "Grundsalg monitor run";

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_runs_total", "Monitor runs started.");
        describe_counter!(
            "monitor_urls_discovered_total",
            "Candidate URLs queued for analysis."
        );
        describe_counter!("monitor_proposals_total", "Proposals created.");
        describe_counter!(
            "monitor_failures_total",
            "Failures recorded, labelled by kind."
        );
        describe_counter!(
            "monitor_scraper_calls_total",
            "Calls to the scraping service, including retries."
        );
        describe_gauge!("monitor_last_run_ts", "Unix ts when the last run finished.");
    });
}

// ------------------------------------------------------------
// Run results
// ------------------------------------------------------------

/// An accepted listing, ready for the `proposals` table and the notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Proposal {
    pub created_at: DateTime<Utc>,
    pub source_id: String,
    pub source_name: String,
    pub category: Category,
    pub listing: ExtractedListing,
}

impl Proposal {
    pub fn url(&self) -> &str {
        &self.listing.url
    }

    /// `[ts, source_id, municipality, title, summary, confidence, published_date, url, category]`
    pub fn to_row(&self) -> Row {
        let l = &self.listing;
        vec![
            json!(iso(self.created_at)),
            json!(self.source_id),
            json!(l.municipality.as_deref().unwrap_or("")),
            json!(l.title.as_deref().unwrap_or("")),
            json!(l.summary.as_deref().unwrap_or("")),
            json!(l.confidence),
            json!(l
                .published_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default()),
            json!(l.url),
            json!(self.category.as_str()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    NoSources,
    NoNewUrls,
    Completed,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RunOutcome::NoSources => "no_sources",
            RunOutcome::NoNewUrls => "no_new_urls",
            RunOutcome::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub stats: RunStats,
    pub proposals: Vec<Proposal>,
    pub summary: String,
}

// ------------------------------------------------------------
// Run context
// ------------------------------------------------------------

/// A URL queued for analysis together with the source that produced it.
#[derive(Debug, Clone)]
pub struct QueuedUrl {
    pub source: Source,
    pub url: String,
}

/// All mutable state of one run.
pub struct RunContext<'a> {
    store: &'a dyn SheetStore,
    pub started_at: DateTime<Utc>,
    pub stats: RunStats,
    pub seen: SeenStore,
    pub queued: Vec<QueuedUrl>,
    queued_set: HashSet<String>,
    pub proposals: Vec<Proposal>,
}

impl<'a> RunContext<'a> {
    pub fn new(store: &'a dyn SheetStore, seen: SeenStore) -> Self {
        Self {
            store,
            started_at: Utc::now(),
            stats: RunStats::new(),
            seen,
            queued: Vec::new(),
            queued_set: HashSet::new(),
            proposals: Vec::new(),
        }
    }

    /// Append a row; a failed write becomes a `persistence` failure in stats.
    pub async fn persist(&mut self, sheet: Sheet, row: Row) {
        if let Err(e) = self.store.append(sheet, row).await {
            let message = format!("append to {sheet} failed: {e:#}");
            warn!(target: "store", backend = self.store.name(), %sheet, error = %message, "persist failed");
            self.note_failure(FailureKind::Persistence, "", "", message);
        }
    }

    /// Record a failure in stats and in the `failures` table.
    pub async fn record_failure(
        &mut self,
        kind: FailureKind,
        source_id: &str,
        url: &str,
        message: impl Into<String>,
    ) {
        let message = message.into();
        let row = failure_row(Utc::now(), kind.as_str(), source_id, url, &message);
        self.note_failure(kind, source_id, url, message);
        self.persist(Sheet::Failures, row).await;
    }

    /// Stats and metrics only, no backend write.
    fn note_failure(&mut self, kind: FailureKind, source_id: &str, url: &str, message: String) {
        counter!("monitor_failures_total", "kind" => kind.as_str()).increment(1);
        self.stats.record(FailureRecord {
            timestamp: Utc::now(),
            kind,
            source_id: source_id.to_string(),
            url: url.to_string(),
            message,
        });
    }

    /// Terminal step for every analysed URL.
    pub async fn mark_seen(&mut self, url: &str) {
        if self.seen.mark_seen(url) {
            self.persist(Sheet::SeenUrls, seen_row(url.trim(), Utc::now()))
                .await;
        }
    }

    pub fn is_queued(&self, url: &str) -> bool {
        self.queued_set.contains(url.trim())
    }

    /// Queue a URL unless an earlier source already did.
    pub fn queue(&mut self, source: &Source, url: String) -> bool {
        if !self.queued_set.insert(url.trim().to_string()) {
            return false;
        }
        self.queued.push(QueuedUrl {
            source: source.clone(),
            url,
        });
        true
    }
}

// ------------------------------------------------------------
// Monitor
// ------------------------------------------------------------

pub struct Monitor {
    scraper: RateLimitedClient<Arc<dyn Scraper>>,
    classifier: Classifier,
    extractor: Extractor,
    store: Arc<dyn SheetStore>,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(
        scraper: Arc<dyn Scraper>,
        model: DynModel,
        store: Arc<dyn SheetStore>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            scraper: RateLimitedClient::new(scraper, config.retry),
            classifier: Classifier::new(model.clone(), config.failure_policy),
            extractor: Extractor::new(model),
            store,
            notifier,
            config,
        }
    }

    /// Load the source list from the configured paths, then run.
    pub async fn run_from_config(&self) -> RunReport {
        let sources = load_sources(&self.config.sources_path, &self.config.sources_csv_path);
        self.run_once(&sources).await
    }

    pub async fn run_once(&self, sources: &[Source]) -> RunReport {
        ensure_metrics_described();
        counter!("monitor_runs_total").increment(1);

        if sources.is_empty() {
            warn!("no sources configured, nothing to do");
            gauge!("monitor_last_run_ts").set(Utc::now().timestamp() as f64);
            return RunReport {
                outcome: RunOutcome::NoSources,
                stats: RunStats::new(),
                proposals: Vec::new(),
                summary: "No sources configured".to_string(),
            };
        }

        let store = self.store.as_ref();
        let (seen, seen_error) = match SeenStore::load(store).await {
            Ok(seen) => (seen, None),
            Err(e) => (SeenStore::new(), Some(format!("{e:#}"))),
        };
        let mut ctx = RunContext::new(store, seen);
        if let Some(message) = seen_error {
            warn!(target: "store", backend = store.name(), error = %message, "seen-set unavailable, continuing with an empty one");
            ctx.note_failure(
                FailureKind::Persistence,
                "",
                "",
                format!("reading seen_urls failed: {message}"),
            );
        }
        info!(
            sources = sources.len(),
            seen = ctx.seen.len(),
            "run started"
        );

        // 1) discovery
        self.discovery_phase(&mut ctx, sources).await;

        if ctx.queued.is_empty() {
            let summary = format!(
                "No new URLs discovered ({} sources checked)",
                ctx.stats.sources_processed
            );
            ctx.persist(Sheet::Events, event_row(Utc::now(), RUN_EVENT_TITLE, &summary))
                .await;
            gauge!("monitor_last_run_ts").set(Utc::now().timestamp() as f64);
            info!(%summary, "run finished");
            return RunReport {
                outcome: RunOutcome::NoNewUrls,
                stats: ctx.stats,
                proposals: ctx.proposals,
                summary,
            };
        }

        // 2) analysis
        let queued = std::mem::take(&mut ctx.queued);
        for item in &queued {
            self.analyse(&mut ctx, item).await;
        }
        ctx.queued = queued;

        // 3) summary
        let summary = ctx.stats.summary();
        ctx.persist(Sheet::Events, event_row(Utc::now(), RUN_EVENT_TITLE, &summary))
            .await;

        let message = format!(
            "Grundsalg monitor: {} new proposal(s) from {} URL(s)",
            ctx.proposals.len(),
            ctx.stats.urls_attempted
        );
        let payload = format_notification(&message, &ctx.proposals, &ctx.stats);
        if let Err(e) = self.notifier.send(&payload).await {
            warn!(target: "notify", notifier = self.notifier.name(), error = %format!("{e:#}"), "notification delivery failed");
        }

        gauge!("monitor_last_run_ts").set(Utc::now().timestamp() as f64);
        info!(%summary, "run finished");
        RunReport {
            outcome: RunOutcome::Completed,
            stats: ctx.stats,
            proposals: ctx.proposals,
            summary,
        }
    }

    async fn discovery_phase(&self, ctx: &mut RunContext<'_>, sources: &[Source]) {
        let engine = DiscoveryEngine::new(&self.scraper, self.config.per_source_max);
        let mut budget = DiscoveryBudget::new(self.config.global_max);

        for source in sources {
            if budget.is_exhausted() {
                info!(target: "discovery", source = %source.id, "global URL cap reached, skipping source");
                ctx.stats.sources_skipped += 1;
                continue;
            }
            ctx.stats.sources_processed += 1;

            let urls = match engine.discover(source, &ctx.seen).await {
                Ok(urls) => urls,
                Err(e) => {
                    warn!(target: "discovery", source = %source.id, error = %e, "discovery failed");
                    ctx.record_failure(FailureKind::Discovery, &source.id, &source.url, e.to_string())
                        .await;
                    continue;
                }
            };

            let fresh: Vec<String> = urls.into_iter().filter(|u| !ctx.is_queued(u)).collect();
            for url in budget.admit(fresh) {
                let row = discovery_row(Utc::now(), &source.id, &source.name, &url);
                if ctx.queue(source, url) {
                    ctx.persist(Sheet::Discoveries, row).await;
                }
            }
        }

        ctx.stats.urls_discovered = ctx.queued.len();
        counter!("monitor_urls_discovered_total").increment(ctx.queued.len() as u64);
        info!(
            target: "discovery",
            processed = ctx.stats.sources_processed,
            skipped = ctx.stats.sources_skipped,
            urls = ctx.queued.len(),
            "discovery finished"
        );
    }

    /// Scrape → classify → maybe extract. Always ends with `mark_seen`.
    async fn analyse(&self, ctx: &mut RunContext<'_>, item: &QueuedUrl) {
        self.analyse_url(ctx, item).await;
        ctx.mark_seen(&item.url).await;
    }

    async fn analyse_url(&self, ctx: &mut RunContext<'_>, item: &QueuedUrl) {
        let QueuedUrl { source, url } = item;
        ctx.stats.urls_attempted += 1;

        let page = match self.scraper.scrape(url, &[Format::Markdown]).await {
            Ok(page) => page,
            Err(e) => {
                ctx.record_failure(FailureKind::Scrape, &source.id, url, e.to_string())
                    .await;
                return;
            }
        };
        let Some(content) = page.content() else {
            ctx.record_failure(FailureKind::Scrape, &source.id, url, "empty content")
                .await;
            return;
        };
        ctx.stats.scrape_successes += 1;

        let verdict = if source.discovery_config().classify_before_extract {
            match self.classifier.classify(url, content).await {
                Ok(v) if v.is_fallback() => {
                    ctx.record_failure(
                        FailureKind::Classification,
                        &source.id,
                        url,
                        v.reason.clone(),
                    )
                    .await;
                    v
                }
                Ok(v) => {
                    ctx.stats.classification_successes += 1;
                    v
                }
                Err(e) => {
                    ctx.record_failure(FailureKind::Classification, &source.id, url, e.to_string())
                        .await;
                    return;
                }
            }
        } else {
            ctx.stats.classification_successes += 1;
            Classification::trusted_source()
        };

        if !verdict.is_relevant {
            debug!(target: "analysis", %url, category = %verdict.category, "irrelevant");
            ctx.stats.skipped_irrelevant += 1;
            return;
        }

        let listing = match self.extractor.extract(url, content).await {
            Ok(listing) => listing,
            Err(e) => {
                ctx.record_failure(FailureKind::Extraction, &source.id, url, e.to_string())
                    .await;
                return;
            }
        };
        ctx.stats.extraction_successes += 1;

        if listing.confidence < self.config.min_proposal_confidence {
            debug!(target: "analysis", %url, confidence = listing.confidence, "below proposal threshold");
            ctx.stats.skipped_irrelevant += 1;
            return;
        }

        let proposal = Proposal {
            created_at: Utc::now(),
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            category: verdict.category,
            listing,
        };
        ctx.persist(Sheet::Proposals, proposal.to_row()).await;
        counter!("monitor_proposals_total").increment(1);
        ctx.stats.proposals_created += 1;
        info!(target: "analysis", source = %source.id, %url, "proposal created");
        ctx.proposals.push(proposal);
    }
}

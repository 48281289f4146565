use std::sync::{Arc, Mutex};

use grundsalg_monitor::analyze::Category;
use grundsalg_monitor::config::MonitorConfig;
use grundsalg_monitor::pipeline::{Monitor, RunOutcome};
use grundsalg_monitor::scrape::RetryPolicy;
use grundsalg_monitor::sources::{Source, SourceType};
use grundsalg_monitor::store::{MemorySheetStore, Sheet, SheetStore};
use grundsalg_monitor::testing::{FlakySheetStore, MockModel, MockScraper, RecordingNotifier};
use grundsalg_monitor::DEFAULT_LOG_FILTER;
use serde_json::json;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::EnvFilter;

const LISTING: &str = r#"{"title": "Byggegrunde i Ølby", "municipality": "Køge", "summary": "Tre grunde til salg", "confidence": 0.8, "published_date": "2026-02-01"}"#;
const SALE_PAGE: &str = "Køge Kommune sælger nu byggegrunde i Ølby.";

fn config() -> MonitorConfig {
    MonitorConfig {
        retry: RetryPolicy::immediate(1),
        ..MonitorConfig::default()
    }
}

fn monitor(
    scraper: Arc<MockScraper>,
    model: Arc<MockModel>,
    store: Arc<dyn SheetStore>,
    notifier: Arc<RecordingNotifier>,
    config: MonitorConfig,
) -> Monitor {
    Monitor::new(scraper, model, store, notifier, config)
}

fn news(id: &str, url: &str) -> Source {
    Source::new(id, format!("{id} kommune"), url).with_kind(SourceType::NewsFeed)
}

fn urls(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}/nyhed-{i}")).collect()
}

fn seen_urls(store: &MemorySheetStore) -> Vec<String> {
    store
        .rows(Sheet::SeenUrls)
        .iter()
        .filter_map(|r| r[0].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn scrape_failure_is_isolated_and_marked_seen() {
    let scraper = Arc::new(
        MockScraper::new()
            .failing_scrape("https://x.dk/")
            .with_page("https://y.dk/", SALE_PAGE),
    );
    let model = Arc::new(MockModel::new().on_extract(LISTING));
    let store = Arc::new(MemorySheetStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let m = monitor(scraper.clone(), model, store.clone(), notifier.clone(), config());

    let sources = vec![
        Source::new("x", "X", "https://x.dk/").with_kind(SourceType::Minimal),
        Source::new("y", "Y", "https://y.dk/").with_kind(SourceType::Minimal),
    ];
    let report = m.run_once(&sources).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(scraper.scrape_attempts("https://x.dk/"), 2);
    assert_eq!(report.stats.scrape_failures.len(), 1);
    assert_eq!(report.stats.scrape_failures[0].url, "https://x.dk/");
    assert_eq!(report.proposals.len(), 1);
    assert_eq!(report.proposals[0].url(), "https://y.dk/");
    assert_eq!(seen_urls(&store), vec!["https://x.dk/", "https://y.dk/"]);

    let failures = store.rows(Sheet::Failures);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0][1], json!("scrape"));
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn second_run_is_idempotent() {
    let found = urls("https://koege.dk/nyheder", 3);
    let mut mock = MockScraper::new().with_map("https://koege.dk/nyheder", found.clone());
    for u in &found {
        mock = mock.with_page(u, SALE_PAGE);
    }
    let scraper = Arc::new(mock);
    let model = Arc::new(MockModel::new().on_extract(LISTING));
    let store = Arc::new(MemorySheetStore::new());
    let sources = vec![news("koege", "https://koege.dk/nyheder")];

    let first = monitor(
        scraper.clone(),
        model.clone(),
        store.clone(),
        Arc::new(RecordingNotifier::new()),
        config(),
    )
    .run_once(&sources)
    .await;
    assert_eq!(first.outcome, RunOutcome::Completed);
    assert_eq!(first.proposals.len(), 3);
    assert!(first
        .proposals
        .iter()
        .all(|p| p.category == Category::KeywordMatch));

    let notifier = Arc::new(RecordingNotifier::new());
    let second = monitor(scraper.clone(), model, store.clone(), notifier.clone(), config())
        .run_once(&sources)
        .await;
    assert_eq!(second.outcome, RunOutcome::NoNewUrls);
    assert_eq!(second.stats.urls_attempted, 0);
    assert!(second.proposals.is_empty());
    assert!(notifier.sent().is_empty());

    // each URL seen exactly once, scraped exactly once
    let seen = seen_urls(&store);
    assert_eq!(seen, found);
    for u in &found {
        assert_eq!(scraper.scrape_attempts(u), 1);
    }
    assert_eq!(store.rows(Sheet::Events).len(), 2);
}

#[tokio::test]
async fn per_source_cap_keeps_first_twenty_five_in_order() {
    let found = urls("https://odense.dk/nyt", 30);
    let scraper = Arc::new(MockScraper::new().with_map("https://odense.dk/nyt", found.clone()));
    let store = Arc::new(MemorySheetStore::new());
    let cfg = MonitorConfig {
        retry: RetryPolicy::immediate(0),
        ..MonitorConfig::default()
    };
    let m = monitor(
        scraper.clone(),
        Arc::new(MockModel::new()),
        store.clone(),
        Arc::new(RecordingNotifier::new()),
        cfg,
    );

    let report = m.run_once(&[news("odense", "https://odense.dk/nyt")]).await;

    assert_eq!(report.stats.urls_discovered, 25);
    let logged: Vec<String> = store
        .rows(Sheet::Discoveries)
        .iter()
        .map(|r| r[3].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(logged, found[..25].to_vec());
    assert_eq!(scraper.scrape_calls(), found[..25].to_vec());

    let map_calls = scraper.map_calls();
    let (_, options) = &map_calls[0];
    assert_eq!(options.limit, 30);
    assert_eq!(options.search.as_deref(), Some("grund salg udbud ejendom"));
}

#[tokio::test]
async fn global_cap_truncates_then_skips_sources() {
    let scraper = Arc::new(
        MockScraper::new()
            .with_map("https://a.dk/nyt", urls("https://a.dk/nyt", 20))
            .with_map("https://b.dk/nyt", urls("https://b.dk/nyt", 20))
            .with_map("https://c.dk/nyt", urls("https://c.dk/nyt", 20)),
    );
    let cfg = MonitorConfig {
        retry: RetryPolicy::immediate(0),
        global_max: 30,
        ..MonitorConfig::default()
    };
    let m = monitor(
        scraper.clone(),
        Arc::new(MockModel::new()),
        Arc::new(MemorySheetStore::new()),
        Arc::new(RecordingNotifier::new()),
        cfg,
    );
    let sources = vec![
        news("a", "https://a.dk/nyt"),
        news("b", "https://b.dk/nyt"),
        news("c", "https://c.dk/nyt"),
    ];

    let report = m.run_once(&sources).await;

    assert_eq!(report.stats.urls_discovered, 30);
    assert_eq!(report.stats.sources_processed, 2);
    assert_eq!(report.stats.sources_skipped, 1);
    assert_eq!(scraper.map_calls().len(), 2);
    let calls = scraper.scrape_calls();
    assert_eq!(calls.iter().filter(|u| u.starts_with("https://b.dk")).count(), 10);
}

#[tokio::test]
async fn zero_per_source_cap_discovers_nothing() {
    let scraper = Arc::new(
        MockScraper::new()
            .with_map("https://a.dk/nyt", urls("https://a.dk/nyt", 3))
            .with_page("https://m.dk/", SALE_PAGE),
    );
    let cfg = MonitorConfig {
        retry: RetryPolicy::immediate(0),
        per_source_max: 0,
        ..MonitorConfig::default()
    };
    let m = monitor(
        scraper.clone(),
        Arc::new(MockModel::new()),
        Arc::new(MemorySheetStore::new()),
        Arc::new(RecordingNotifier::new()),
        cfg,
    );
    let sources = vec![
        news("a", "https://a.dk/nyt"),
        Source::new("m", "M", "https://m.dk/").with_kind(SourceType::Minimal),
    ];

    let report = m.run_once(&sources).await;

    assert_eq!(report.outcome, RunOutcome::NoNewUrls);
    assert_eq!(report.stats.urls_discovered, 0);
    assert!(scraper.scrape_calls().is_empty());
}

#[derive(Clone, Default)]
struct CapturedEvents(Arc<Mutex<Vec<(String, String)>>>);

impl<S: tracing::Subscriber> Layer<S> for CapturedEvents {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct Message(String);
        impl Visit for Message {
            fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{value:?}");
                }
            }
        }
        let mut msg = Message(String::new());
        event.record(&mut msg);
        if let Ok(mut seen) = self.0.lock() {
            seen.push((event.metadata().target().to_string(), msg.0));
        }
    }
}

#[tokio::test]
async fn default_log_filter_keeps_discovery_info() {
    let captured = CapturedEvents::default();
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(DEFAULT_LOG_FILTER))
        .with(captured.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let scraper = Arc::new(
        MockScraper::new()
            .with_map("https://a.dk/nyt", urls("https://a.dk/nyt", 5))
            .with_map("https://b.dk/nyt", urls("https://b.dk/nyt", 5)),
    );
    let cfg = MonitorConfig {
        retry: RetryPolicy::immediate(0),
        global_max: 2,
        ..MonitorConfig::default()
    };
    let m = monitor(
        scraper,
        Arc::new(MockModel::new()),
        Arc::new(MemorySheetStore::new()),
        Arc::new(RecordingNotifier::new()),
        cfg,
    );

    let report = m
        .run_once(&[news("a", "https://a.dk/nyt"), news("b", "https://b.dk/nyt")])
        .await;
    assert_eq!(report.stats.sources_skipped, 1);

    let events = captured.0.lock().map(|e| e.clone()).unwrap_or_default();
    assert!(events
        .iter()
        .any(|(t, m)| t == "discovery" && m.contains("global URL cap reached")));
    assert!(events
        .iter()
        .any(|(t, m)| t == "discovery" && m.contains("source discovered")));
}

#[tokio::test]
async fn url_found_by_two_sources_is_analysed_once() {
    let shared = "https://region.dk/udbud/grund-1".to_string();
    let scraper = Arc::new(
        MockScraper::new()
            .with_map("https://a.dk/nyt", vec![shared.clone()])
            .with_map("https://b.dk/nyt", vec![shared.clone()])
            .with_page(&shared, SALE_PAGE),
    );
    let m = monitor(
        scraper.clone(),
        Arc::new(MockModel::new().on_extract(LISTING)),
        Arc::new(MemorySheetStore::new()),
        Arc::new(RecordingNotifier::new()),
        config(),
    );

    let report = m
        .run_once(&[news("a", "https://a.dk/nyt"), news("b", "https://b.dk/nyt")])
        .await;

    assert_eq!(report.stats.urls_discovered, 1);
    assert_eq!(report.proposals.len(), 1);
    assert_eq!(report.proposals[0].source_id, "a");
    assert_eq!(scraper.scrape_attempts(&shared), 1);
}

#[tokio::test]
async fn dedicated_portal_skips_classification() {
    let page = "https://grundsalg.koege.dk/grunde/7";
    let scraper = Arc::new(
        MockScraper::new()
            .with_map("https://grundsalg.koege.dk/", vec![page.to_string()])
            .with_page(page, "Matrikel 7, 850 m2, pris 450.000 kr."),
    );
    let model = Arc::new(MockModel::new().on_extract(LISTING));
    let m = monitor(
        scraper,
        model.clone(),
        Arc::new(MemorySheetStore::new()),
        Arc::new(RecordingNotifier::new()),
        config(),
    );
    let source = Source::new("koege-portal", "Køge grundsalg", "https://grundsalg.koege.dk/")
        .with_kind(SourceType::DedicatedPortal);

    let report = m.run_once(&[source]).await;

    assert_eq!(model.calls(), 1);
    assert_eq!(report.proposals.len(), 1);
    assert_eq!(report.proposals[0].category, Category::TrustedSource);
    assert_eq!(report.stats.classification_successes, 1);
}

#[tokio::test]
async fn model_outage_fails_open_then_extraction_fails() {
    let page = "https://roskilde.dk/nyheder/byraad";
    let scraper = Arc::new(
        MockScraper::new()
            .with_map("https://roskilde.dk/nyheder", vec![page.to_string()])
            .with_page(page, "Referat fra byrådets møde i marts."),
    );
    let store = Arc::new(MemorySheetStore::new());
    let m = monitor(
        scraper,
        Arc::new(MockModel::failing("503 from model")),
        store.clone(),
        Arc::new(RecordingNotifier::new()),
        config(),
    );

    let report = m.run_once(&[news("roskilde", "https://roskilde.dk/nyheder")]).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.stats.classification_failures.len(), 1);
    assert_eq!(report.stats.classification_successes, 0);
    assert_eq!(report.stats.extraction_failures.len(), 1);
    assert!(report.proposals.is_empty());
    assert_eq!(seen_urls(&store), vec![page.to_string()]);
}

#[tokio::test]
async fn low_confidence_listing_is_not_proposed() {
    let page = "https://aarhus.dk/nyt/grundsalg-1";
    let scraper = Arc::new(
        MockScraper::new()
            .with_map("https://aarhus.dk/nyt", vec![page.to_string()])
            .with_page(page, SALE_PAGE),
    );
    let model = MockModel::new().on_extract(r#"{"title": "Måske", "confidence": 0.1}"#);
    let m = monitor(
        scraper,
        Arc::new(model),
        Arc::new(MemorySheetStore::new()),
        Arc::new(RecordingNotifier::new()),
        config(),
    );

    let report = m.run_once(&[news("aarhus", "https://aarhus.dk/nyt")]).await;

    assert!(report.proposals.is_empty());
    assert_eq!(report.stats.extraction_successes, 1);
    assert_eq!(report.stats.skipped_irrelevant, 1);
}

#[tokio::test]
async fn boilerplate_page_is_irrelevant() {
    let page = "https://vejle.dk/kontakt";
    let scraper = Arc::new(
        MockScraper::new()
            .with_map("https://vejle.dk/", vec![page.to_string()])
            .with_page(page, "Kontakt os på telefon 7681 0000. Læs vores cookie-politik."),
    );
    let model = Arc::new(MockModel::new());
    let m = monitor(
        scraper,
        model.clone(),
        Arc::new(MemorySheetStore::new()),
        Arc::new(RecordingNotifier::new()),
        config(),
    );

    let report = m.run_once(&[Source::new("vejle", "Vejle", "https://vejle.dk/")]).await;

    assert_eq!(report.stats.skipped_irrelevant, 1);
    assert_eq!(report.stats.classification_successes, 1);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn persistence_outage_never_aborts_the_run() {
    let scraper = Arc::new(MockScraper::new().with_page("https://x.dk/", SALE_PAGE));
    let store = Arc::new(
        FlakySheetStore::new()
            .failing_reads()
            .failing_append(Sheet::Proposals),
    );
    let m = monitor(
        scraper,
        Arc::new(MockModel::new().on_extract(LISTING)),
        store.clone(),
        Arc::new(RecordingNotifier::failing()),
        config(),
    );

    let report = m
        .run_once(&[Source::new("x", "X", "https://x.dk/").with_kind(SourceType::Minimal)])
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.proposals.len(), 1);
    // seen_urls read + proposals append
    assert_eq!(report.stats.persistence_failures.len(), 2);
    assert_eq!(store.rows(Sheet::SeenUrls).len(), 1);
    assert!(store.rows(Sheet::Failures).is_empty());
}

#[tokio::test]
async fn discovery_failure_moves_to_next_source() {
    let page = "https://b.dk/nyt/grund";
    let scraper = Arc::new(
        MockScraper::new()
            .failing_map("https://a.dk/nyt")
            .with_map("https://b.dk/nyt", vec![page.to_string()])
            .with_page(page, SALE_PAGE),
    );
    let m = monitor(
        scraper.clone(),
        Arc::new(MockModel::new().on_extract(LISTING)),
        Arc::new(MemorySheetStore::new()),
        Arc::new(RecordingNotifier::new()),
        config(),
    );

    let report = m
        .run_once(&[news("a", "https://a.dk/nyt"), news("b", "https://b.dk/nyt")])
        .await;

    assert_eq!(report.stats.discovery_failures.len(), 1);
    assert_eq!(report.stats.discovery_failures[0].source_id, "a");
    assert_eq!(report.proposals.len(), 1);
    // map retried once for the failing source
    assert_eq!(scraper.map_calls().len(), 3);
}

#[tokio::test]
async fn kortinfo_links_are_mined_from_the_rendered_page() {
    let base = "https://grundsalg.kortinfo.net/koege/";
    let scraper = Arc::new(
        MockScraper::new()
            .with_page(base, "Kort over grunde")
            .with_links(
                base,
                &[
                    base,
                    "https://grundsalg.kortinfo.net/koege/#/boliggrunde/1",
                    "https://grundsalg.kortinfo.net/koege/om-kortet",
                    "https://grundsalg.kortinfo.net/koege/salgsvilkaar.pdf",
                ],
            )
            .with_page("https://grundsalg.kortinfo.net/koege/#/boliggrunde/1", SALE_PAGE),
    );
    let m = monitor(
        scraper.clone(),
        Arc::new(MockModel::new().on_extract(LISTING)),
        Arc::new(MemorySheetStore::new()),
        Arc::new(RecordingNotifier::new()),
        config(),
    );
    let source = Source::new("koege-kort", "Køge kort", base).with_kind(SourceType::Kortinfo);

    let report = m.run_once(&[source]).await;

    assert_eq!(report.stats.urls_discovered, 1);
    assert_eq!(report.proposals.len(), 1);
    assert_eq!(report.proposals[0].category, Category::TrustedSource);
}

#[tokio::test]
async fn no_sources_and_no_new_urls_are_quiet() {
    let store = Arc::new(MemorySheetStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let m = monitor(
        Arc::new(MockScraper::new().with_map("https://a.dk/nyt", vec![])),
        Arc::new(MockModel::new()),
        store.clone(),
        notifier.clone(),
        config(),
    );

    let none = m.run_once(&[]).await;
    assert_eq!(none.outcome, RunOutcome::NoSources);

    let empty = m.run_once(&[news("a", "https://a.dk/nyt")]).await;
    assert_eq!(empty.outcome, RunOutcome::NoNewUrls);
    assert_eq!(empty.stats.sources_processed, 1);
    let events = store.rows(Sheet::Events);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].len(), 13);
    assert!(notifier.sent().is_empty());
}

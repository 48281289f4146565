use std::fs;
use std::path::Path;
use std::sync::Arc;

use grundsalg_monitor::config::MonitorConfig;
use grundsalg_monitor::pipeline::{Monitor, RunOutcome};
use grundsalg_monitor::scrape::RetryPolicy;
use grundsalg_monitor::sources::{load_sources, SourceType};
use grundsalg_monitor::store::MemorySheetStore;
use grundsalg_monitor::testing::{MockModel, MockScraper, RecordingNotifier};

const CSV: &str = "id,name,url,type\n\
                   koege,Køge Kommune,https://koege.dk/,minimal\n\
                   roskilde,Roskilde,https://roskilde.dk/nyheder\n";

#[test]
fn structured_file_wins_over_csv() {
    let dir = tempfile::tempdir().unwrap();
    let toml = dir.path().join("sources.toml");
    let csv = dir.path().join("sources.csv");
    fs::write(
        &toml,
        "[[sources]]\nid = \"aarhus\"\nname = \"Aarhus\"\nurl = \"https://grundsalg.aarhus.dk/\"\ntype = \"dedicated_portal\"\n",
    )
    .unwrap();
    fs::write(&csv, CSV).unwrap();

    let v = load_sources(&toml, &csv);
    assert_eq!(v.len(), 1);
    assert_eq!(v[0].kind, SourceType::DedicatedPortal);
}

#[test]
fn broken_or_empty_primary_falls_back_to_csv() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("sources.csv");
    fs::write(&csv, CSV).unwrap();

    let broken = dir.path().join("sources.toml");
    fs::write(&broken, "sources = [ this is not toml").unwrap();
    let v = load_sources(&broken, &csv);
    assert_eq!(
        v.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        vec!["koege", "roskilde"]
    );
    assert_eq!(v[1].kind, SourceType::MunicipalitySubsection);

    let empty = dir.path().join("empty.json");
    fs::write(&empty, r#"{"sources": []}"#).unwrap();
    assert_eq!(load_sources(&empty, &csv).len(), 2);

    assert_eq!(load_sources(Path::new("missing.toml"), &csv).len(), 2);
}

#[test]
fn nothing_resolvable_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let v = load_sources(&dir.path().join("a.toml"), &dir.path().join("b.csv"));
    assert!(v.is_empty());
}

#[serial_test::serial]
#[tokio::test]
async fn run_from_config_uses_env_paths() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("sources.csv");
    fs::write(&csv, "id,name,url,type\nkoege,Køge,https://koege.dk/,minimal\n").unwrap();

    std::env::set_var("SOURCES_PATH", dir.path().join("none.toml"));
    std::env::set_var("SOURCES_CSV_PATH", &csv);
    let config = MonitorConfig {
        retry: RetryPolicy::immediate(0),
        ..MonitorConfig::from_env()
    };
    std::env::remove_var("SOURCES_PATH");
    std::env::remove_var("SOURCES_CSV_PATH");

    let scraper = Arc::new(MockScraper::new().with_page("https://koege.dk/", "Kontakt os"));
    let monitor = Monitor::new(
        scraper.clone(),
        Arc::new(MockModel::new()),
        Arc::new(MemorySheetStore::new()),
        Arc::new(RecordingNotifier::new()),
        config,
    );
    let report = monitor.run_from_config().await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(scraper.scrape_calls(), vec!["https://koege.dk/".to_string()]);
    assert_eq!(report.stats.skipped_irrelevant, 1);

    let missing = MonitorConfig {
        sources_path: dir.path().join("x.toml"),
        sources_csv_path: dir.path().join("x.csv"),
        ..MonitorConfig::default()
    };
    let quiet = Monitor::new(
        Arc::new(MockScraper::new()),
        Arc::new(MockModel::new()),
        Arc::new(MemorySheetStore::new()),
        Arc::new(RecordingNotifier::new()),
        missing,
    );
    assert_eq!(quiet.run_from_config().await.outcome, RunOutcome::NoSources);
}

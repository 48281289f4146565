//! grundsalg-monitor: one sequential monitoring run, then exit.
//! Scheduling is external (cron / CI). See `README.md`.

use grundsalg_monitor::{build_monitor_from_env, DEFAULT_LOG_FILTER};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default; `MONITOR_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json = std::env::var("MONITOR_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env locally; no-op where the scheduler injects env.
    let _ = dotenvy::dotenv();
    init_tracing();

    let monitor = match build_monitor_from_env() {
        Ok(m) => m,
        Err(e) => {
            error!(error = %format!("{e:#}"), "cannot start monitor");
            return Err(e);
        }
    };

    let report = monitor.run_from_config().await;
    info!(
        outcome = report.outcome.as_str(),
        proposals = report.proposals.len(),
        failures = report.stats.total_failures(),
        summary = %report.summary,
        "done"
    );
    Ok(())
}

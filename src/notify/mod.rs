// src/notify/mod.rs
//! Run notification: a pure formatter plus the delivery trait.

pub mod webhook;

use anyhow::Result;
use serde::Serialize;

use crate::pipeline::{FailureKind, Proposal, RunStats};

pub use webhook::WebhookNotifier;

pub const MAX_LISTED_PROPOSALS: usize = 10;
pub const MAX_LISTED_FAILURES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub message: String,
    pub proposals_count: usize,
    pub details: String,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, payload: &NotificationPayload) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// No webhook configured.
pub struct DisabledNotifier;

#[async_trait::async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, _payload: &NotificationPayload) -> Result<()> {
        tracing::debug!(target: "notify", "notifications disabled (no NOTIFY_WEBHOOK_URL)");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Build the notification body. Bounded: at most 10 proposals and 5 failures
/// per kind are listed.
pub fn format_notification(
    message: &str,
    proposals: &[Proposal],
    stats: &RunStats,
) -> NotificationPayload {
    let mut lines: Vec<String> = vec![stats.summary()];

    if !proposals.is_empty() {
        lines.push(String::new());
        lines.push(format!("Proposals ({}):", proposals.len()));
        for p in proposals.iter().take(MAX_LISTED_PROPOSALS) {
            lines.push(proposal_line(p));
            lines.push(format!("  {}", p.url()));
        }
        if proposals.len() > MAX_LISTED_PROPOSALS {
            lines.push(format!("… and {} more", proposals.len() - MAX_LISTED_PROPOSALS));
        }
    }

    for kind in FailureKind::ALL {
        let failures = stats.failures(kind);
        if failures.is_empty() {
            continue;
        }
        lines.push(String::new());
        lines.push(format!("{} failures ({}):", kind, failures.len()));
        for f in failures.iter().take(MAX_LISTED_FAILURES) {
            let target = if f.url.is_empty() { &f.source_id } else { &f.url };
            if target.is_empty() {
                lines.push(format!("• {}", f.message));
            } else {
                lines.push(format!("• {}: {}", target, f.message));
            }
        }
        if failures.len() > MAX_LISTED_FAILURES {
            lines.push(format!("… and {} more", failures.len() - MAX_LISTED_FAILURES));
        }
    }

    NotificationPayload {
        message: message.to_string(),
        proposals_count: proposals.len(),
        details: lines.join("\n"),
    }
}

/// `• title — municipality (NN%), published YYYY-MM-DD`
fn proposal_line(p: &Proposal) -> String {
    let l = &p.listing;
    let mut s = format!("• {}", l.title.as_deref().unwrap_or(p.url()));
    if let Some(m) = &l.municipality {
        s.push_str(" — ");
        s.push_str(m);
    }
    s.push_str(&format!(" ({:.0}%)", l.confidence * 100.0));
    if let Some(d) = l.published_date {
        s.push_str(&format!(", published {}", d.format("%Y-%m-%d")));
    }
    s
}

// src/notify/webhook.rs
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::{NotificationPayload, Notifier};

/// Generic JSON webhook: POSTs the payload as-is.
#[derive(Clone)]
pub struct WebhookNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// `NOTIFY_WEBHOOK_URL`, if set and non-empty.
    pub fn from_env() -> Option<Self> {
        std::env::var("NOTIFY_WEBHOOK_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .map(Self::new)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, payload: &NotificationPayload) -> Result<()> {
        self.client
            .post(&self.webhook)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .context("webhook post")?
            .error_for_status()
            .context("webhook non-2xx")?;
        tracing::info!(target: "notify", proposals = payload.proposals_count, "notification sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

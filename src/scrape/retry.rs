// src/scrape/retry.rs
//! Paced, bounded-retry wrapper around a [`Scraper`].
//!
//! Every attempt waits `request_delay` first (a flat pause, not latency-aware)
//! to stay under the collaborator's quota. Failed attempts are retried up to
//! `max_retries` times with `retry_delay` in between. The final failure comes
//! back as a [`FetchError`]; nothing here panics or aborts the run.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, warn};

use super::{Format, MapOptions, ScrapedPage, Scraper};

pub const DEFAULT_MAX_RETRIES: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub request_delay: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_secs(6),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// No pauses; for tests and local dry runs.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            request_delay: Duration::ZERO,
            max_retries,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{op} {url} failed after {attempts} attempt(s): {message}")]
pub struct FetchError {
    pub op: &'static str,
    pub url: String,
    pub attempts: u32,
    pub message: String,
}

pub struct RateLimitedClient<S: Scraper> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: Scraper> RateLimitedClient<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub async fn scrape(&self, url: &str, formats: &[Format]) -> Result<ScrapedPage, FetchError> {
        self.with_retry("scrape", url, || self.inner.scrape(url, formats))
            .await
    }

    pub async fn map(&self, url: &str, options: &MapOptions) -> Result<Vec<String>, FetchError> {
        self.with_retry("map", url, || self.inner.map(url, options))
            .await
    }

    async fn with_retry<T, F, Fut>(
        &self,
        op: &'static str,
        url: &str,
        mut call: F,
    ) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if attempt > 1 && !self.policy.retry_delay.is_zero() {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
            if !self.policy.request_delay.is_zero() {
                tokio::time::sleep(self.policy.request_delay).await;
            }

            counter!("monitor_scraper_calls_total", "op" => op).increment(1);
            match call().await {
                Ok(v) => {
                    debug!(target: "scrape", op, %url, attempt, "call ok");
                    return Ok(v);
                }
                Err(e) => {
                    warn!(
                        target: "scrape",
                        op, %url, attempt, max_attempts,
                        error = %format!("{e:#}"),
                        "call failed"
                    );
                    if attempt >= max_attempts {
                        return Err(FetchError {
                            op,
                            url: url.to_string(),
                            attempts: attempt,
                            message: format!("{e:#}"),
                        });
                    }
                }
            }
        }
    }
}

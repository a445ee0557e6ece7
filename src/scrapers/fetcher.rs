//! Resilient page fetcher.
//!
//! Wraps a [`Transport`] with the retry policy: timeouts are retried with a
//! sleep between attempts, every other failure ends the attempt loop at once.
//! Failures never propagate as errors; the caller gets [`FetchOutcome::Failed`]
//! and moves on to the next URL.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::Html;
use tracing::{debug, error, warn};

use super::http_client::{HttpClient, Transport};
use super::retry::{RetryPolicy, Sleeper, TokioSleeper};

/// A fetched page body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub url: String,
    pub body: String,
}

impl Page {
    /// Parse the body as an HTML document.
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

/// Result of fetching one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Page(Page),
    Failed,
}

impl FetchOutcome {
    pub fn into_page(self) -> Option<Page> {
        match self {
            FetchOutcome::Page(page) => Some(page),
            FetchOutcome::Failed => None,
        }
    }
}

/// Anything that can turn a URL into a page or a failure.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// Fetcher that applies a [`RetryPolicy`] around a transport.
pub struct ResilientFetcher<T = HttpClient> {
    transport: T,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<T: Transport> ResilientFetcher<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<T: Transport> PageFetcher for ResilientFetcher<T> {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let max = self.policy.max_attempts;
        for attempt in 1..=max {
            match self.transport.get_text(url).await {
                Ok(body) => {
                    debug!(url, attempt, "fetched {} bytes", body.len());
                    return FetchOutcome::Page(Page {
                        url: url.to_string(),
                        body,
                    });
                }
                Err(err) if self.policy.should_retry(attempt, &err) => {
                    warn!(url, attempt, max, "request timed out");
                    self.sleeper.sleep(self.policy.backoff(attempt)).await;
                }
                Err(err) if self.policy.retryable(&err) => {
                    error!(url, attempt, max, "request timed out, giving up");
                    return FetchOutcome::Failed;
                }
                Err(err) => {
                    error!(url, attempt, "fetch failed: {}", err);
                    return FetchOutcome::Failed;
                }
            }
        }
        FetchOutcome::Failed
    }
}

//! Fetching: HTTP client, rate limiting, retries and URL generation.

pub mod fetcher;
pub mod http_client;
pub mod rate_limiter;
pub mod retry;
pub mod urls;

pub use fetcher::{FetchOutcome, Page, PageFetcher, ResilientFetcher};
pub use http_client::{resolve_user_agent, HttpClient, Transport};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use urls::{detail_url, UrlGenerator, PAGE_SIZE};

use thiserror::Error;

/// Why a single HTTP attempt failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

//! Adaptive per-host rate limiter.
//!
//! Spaces out requests to the same host and adapts the spacing to how the
//! host responds: 429/503 doubles the delay, a run of successes walks it back
//! down to the configured base.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Configuration for rate limiting behavior.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Base delay between requests to the same host.
    pub base_delay: Duration,
    /// Ceiling for backoff.
    pub max_delay: Duration,
    /// Applied to the delay on each rate-limit response.
    pub backoff_multiplier: f64,
    /// Applied to the delay during recovery (< 1.0).
    pub recovery_multiplier: f64,
    /// Consecutive successes needed before each recovery step.
    pub recovery_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.8,
            recovery_threshold: 5,
        }
    }
}

impl RateLimitConfig {
    /// Default config with a different base spacing.
    pub fn with_base_delay(base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
struct HostState {
    current_delay: Duration,
    last_request: Option<Instant>,
    consecutive_successes: u32,
    in_backoff: bool,
    total_requests: u64,
    rate_limit_hits: u64,
}

impl HostState {
    fn new(base_delay: Duration) -> Self {
        Self {
            current_delay: base_delay,
            last_request: None,
            consecutive_successes: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    /// Claim the next free start time for this host.
    fn reserve(&mut self, now: Instant) -> Instant {
        let slot = self
            .last_request
            .map(|last| (last + self.current_delay).max(now))
            .unwrap_or(now);
        self.last_request = Some(slot);
        self.total_requests += 1;
        slot
    }
}

/// Snapshot of one host's limiter state.
#[derive(Debug, Clone, PartialEq)]
pub struct HostStats {
    pub host: String,
    pub current_delay: Duration,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

/// Adaptive rate limiter shared by every clone.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    hosts: Arc<RwLock<HashMap<String, HostState>>>,
}

impl Clone for RateLimiter {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            hosts: Arc::clone(&self.hosts),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            hosts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn extract_host(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Reserve the host's next start slot, then wait for it.
    /// Concurrent callers get distinct slots at least the current delay apart.
    /// Returns the host, or None for URLs without one.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let host = Self::extract_host(url)?;

        let slot = {
            let mut hosts = self.hosts.write().await;
            hosts
                .entry(host.clone())
                .or_insert_with(|| HostState::new(self.config.base_delay))
                .reserve(Instant::now())
        };

        let now = Instant::now();
        if slot > now {
            debug!("Rate limiting {}: waiting {:?}", host, slot - now);
            tokio::time::sleep_until(slot).await;
        }

        Some(host)
    }

    /// Record a successful response. Steps the delay back toward base once
    /// enough successes accumulate.
    pub async fn report_success(&self, host: &str) {
        let mut hosts = self.hosts.write().await;
        let Some(state) = hosts.get_mut(host) else {
            return;
        };
        state.consecutive_successes += 1;

        if state.in_backoff && state.consecutive_successes >= self.config.recovery_threshold {
            let reduced = state.current_delay.mul_f64(self.config.recovery_multiplier);
            if reduced <= self.config.base_delay {
                state.current_delay = self.config.base_delay;
                state.in_backoff = false;
                info!("Host {} recovered from rate limit backoff", host);
            } else {
                state.current_delay = reduced;
                debug!("Host {} delay reduced to {:?}", host, reduced);
            }
            state.consecutive_successes = 0;
        }
    }

    /// 429 and 503 are treated as the host asking us to slow down.
    pub fn is_rate_limit_status(status: u16) -> bool {
        matches!(status, 429 | 503)
    }

    /// Record a rate-limit response and widen the delay.
    pub async fn report_rate_limit(&self, host: &str, status: u16) {
        let mut hosts = self.hosts.write().await;
        let Some(state) = hosts.get_mut(host) else {
            return;
        };
        state.rate_limit_hits += 1;
        state.consecutive_successes = 0;
        state.in_backoff = true;
        state.current_delay = state
            .current_delay
            .mul_f64(self.config.backoff_multiplier)
            .min(self.config.max_delay);

        warn!(
            "Rate limited by {} (HTTP {}), backing off to {:?}",
            host, status, state.current_delay
        );
    }

    pub async fn stats(&self, host: &str) -> Option<HostStats> {
        let hosts = self.hosts.read().await;
        hosts.get(host).map(|s| HostStats {
            host: host.to_string(),
            current_delay: s.current_delay,
            in_backoff: s.in_backoff,
            total_requests: s.total_requests,
            rate_limit_hits: s.rate_limit_hits,
        })
    }
}

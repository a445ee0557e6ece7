//! HTTP client with per-host rate limiting and configurable identity.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Proxy};
use tracing::debug;

use super::rate_limiter::{RateLimitConfig, RateLimiter};
use super::FetchError;
use crate::config::{ConfigError, EngineSettings};

const USER_AGENT: &str = concat!("jobharvest/", env!("CARGO_PKG_VERSION"));

/// Real browser user agents for impersonate mode.
const IMPERSONATE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

fn random_user_agent() -> &'static str {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as usize)
        .unwrap_or(0);
    IMPERSONATE_USER_AGENTS[nanos % IMPERSONATE_USER_AGENTS.len()]
}

/// Resolve user agent from config value.
/// - None => default jobharvest user agent
/// - "impersonate" => random real browser user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None => USER_AGENT.to_string(),
        Some("impersonate") => random_user_agent().to_string(),
        Some(custom) => custom.to_string(),
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, ConfigError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::Invalid {
            field: "engine.headers",
            reason: format!("bad header name `{}`: {}", name, e),
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| ConfigError::Invalid {
            field: "engine.headers",
            reason: format!("bad value for `{}`: {}", name, e),
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

fn proxy_for(scheme: &str, url: &str) -> Result<Proxy, ConfigError> {
    let proxy = match scheme {
        "http" => Proxy::http(url),
        "https" => Proxy::https(url),
        _ => Proxy::all(url),
    };
    proxy.map_err(|e| ConfigError::Invalid {
        field: "engine.proxies",
        reason: format!("bad proxy `{}`: {}", url, e),
    })
}

/// Plain GET transport, separated from retry handling so it can be stubbed.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;
}

/// HTTP client carrying the configured headers, proxies and timeout.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter,
}

impl HttpClient {
    /// Build a client from engine settings with its own rate limiter.
    pub fn from_settings(engine: &EngineSettings) -> Result<Self, ConfigError> {
        let limiter = RateLimiter::with_config(RateLimitConfig::with_base_delay(
            engine.request_delay,
        ));
        Self::with_rate_limiter(engine, limiter)
    }

    /// Build a client sharing an existing rate limiter.
    pub fn with_rate_limiter(
        engine: &EngineSettings,
        rate_limiter: RateLimiter,
    ) -> Result<Self, ConfigError> {
        let user_agent = resolve_user_agent(engine.user_agent.as_deref());
        let mut builder = Client::builder()
            .user_agent(&user_agent)
            .timeout(engine.request_timeout)
            .default_headers(header_map(&engine.headers)?)
            .gzip(true)
            .brotli(true);

        for (scheme, url) in &engine.proxies {
            builder = builder.proxy(proxy_for(scheme, url)?);
        }

        let client = builder.build().map_err(|e| ConfigError::Invalid {
            field: "engine",
            reason: format!("failed to build HTTP client: {}", e),
        })?;

        Ok(Self {
            client,
            rate_limiter,
        })
    }

    /// Build a client with only a timeout, bypassing configured proxies.
    pub fn direct(timeout: Duration) -> Result<Self, ConfigError> {
        let engine = EngineSettings {
            request_timeout: timeout,
            request_delay: Duration::ZERO,
            ..Default::default()
        };
        Self::from_settings(&engine)
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// GET a URL and return the body as text. Non-2xx statuses are errors.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let host = self.rate_limiter.acquire(url).await;

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if let Some(ref host) = host {
            if RateLimiter::is_rate_limit_status(status.as_u16()) {
                self.rate_limiter
                    .report_rate_limit(host, status.as_u16())
                    .await;
            } else if status.is_success() {
                self.rate_limiter.report_success(host).await;
            }
        }

        if !status.is_success() {
            debug!("GET {} returned {}", url, status);
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))
    }

    /// GET a URL and decode the JSON body.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, FetchError> {
        let text = self.get_text(url).await?;
        serde_json::from_str(&text).map_err(|e| FetchError::Body(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        HttpClient::get_text(self, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_agent() {
        assert!(resolve_user_agent(None).starts_with("jobharvest/"));
        assert_eq!(resolve_user_agent(Some("custom/1.0")), "custom/1.0");
        let ua = resolve_user_agent(Some("impersonate"));
        assert!(IMPERSONATE_USER_AGENTS.contains(&ua.as_str()));
    }

    #[test]
    fn test_bad_header_rejected() {
        let mut engine = EngineSettings::default();
        engine
            .headers
            .insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            HttpClient::from_settings(&engine),
            Err(ConfigError::Invalid {
                field: "engine.headers",
                ..
            })
        ));
    }

    #[test]
    fn test_builds_with_proxies_and_headers() {
        let mut engine = EngineSettings::default();
        engine
            .headers
            .insert("Accept-Language".to_string(), "en-US".to_string());
        engine
            .proxies
            .insert("https".to_string(), "http://127.0.0.1:3128".to_string());
        assert!(HttpClient::from_settings(&engine).is_ok());
    }
}

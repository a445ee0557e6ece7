//! Verify that configured proxies change the egress IP.

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, EngineSettings};
use crate::scrapers::{FetchError, HttpClient, Transport};

/// IP echo endpoint answering `{"ip": "..."}`.
pub const DEFAULT_IP_ECHO_URL: &str = "https://api.ipify.org?format=json";

#[derive(Debug, Error)]
pub enum ProxyCheckError {
    #[error("no proxies configured")]
    NoProxies,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("direct request failed: {0}")]
    Direct(#[source] FetchError),

    #[error("proxied request failed: {0}")]
    Proxied(#[source] FetchError),

    #[error("proxy is not in use: both requests came from {0}")]
    SameIp(String),
}

#[derive(Debug, Deserialize)]
struct IpEcho {
    ip: String,
}

/// Both egress addresses seen by the echo endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyReport {
    pub direct_ip: String,
    pub proxy_ip: String,
}

async fn egress_ip<T: Transport>(transport: &T, url: &str) -> Result<String, FetchError> {
    let body = transport.get_text(url).await?;
    let echo: IpEcho =
        serde_json::from_str(&body).map_err(|e| FetchError::Body(e.to_string()))?;
    Ok(echo.ip.trim().to_string())
}

/// Compare the IPs reported for a direct and a proxied request.
pub async fn compare_egress<D: Transport, P: Transport>(
    direct: &D,
    proxied: &P,
    echo_url: &str,
) -> Result<ProxyReport, ProxyCheckError> {
    let direct_ip = egress_ip(direct, echo_url)
        .await
        .map_err(ProxyCheckError::Direct)?;
    let proxy_ip = egress_ip(proxied, echo_url)
        .await
        .map_err(ProxyCheckError::Proxied)?;

    if direct_ip == proxy_ip {
        return Err(ProxyCheckError::SameIp(direct_ip));
    }
    info!(%direct_ip, %proxy_ip, "proxy connection verified");
    Ok(ProxyReport {
        direct_ip,
        proxy_ip,
    })
}

/// Run the check with clients built from engine settings.
pub async fn check_proxies(
    engine: &EngineSettings,
    echo_url: &str,
) -> Result<ProxyReport, ProxyCheckError> {
    if engine.proxies.is_empty() {
        return Err(ProxyCheckError::NoProxies);
    }
    let direct = HttpClient::direct(engine.request_timeout)?;
    let proxied = HttpClient::from_settings(engine)?;
    compare_egress(&direct, &proxied, echo_url).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo(Result<&'static str, u16>);

    #[async_trait]
    impl Transport for Echo {
        async fn get_text(&self, _url: &str) -> Result<String, FetchError> {
            match self.0 {
                Ok(ip) => Ok(format!(r#"{{"ip":"{}"}}"#, ip)),
                Err(status) => Err(FetchError::Status(status)),
            }
        }
    }

    #[tokio::test]
    async fn test_different_ips_pass() {
        let report = compare_egress(&Echo(Ok("1.1.1.1")), &Echo(Ok("2.2.2.2")), "x")
            .await
            .unwrap();
        assert_eq!(report.direct_ip, "1.1.1.1");
        assert_eq!(report.proxy_ip, "2.2.2.2");
    }

    #[tokio::test]
    async fn test_same_ip_fails() {
        let err = compare_egress(&Echo(Ok("1.1.1.1")), &Echo(Ok("1.1.1.1")), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyCheckError::SameIp(ref ip) if ip == "1.1.1.1"));
    }

    #[tokio::test]
    async fn test_proxy_failure_is_reported() {
        let err = compare_egress(&Echo(Ok("1.1.1.1")), &Echo(Err(407)), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyCheckError::Proxied(FetchError::Status(407))));
    }

    #[tokio::test]
    async fn test_no_proxies_configured() {
        let err = check_proxies(&EngineSettings::default(), DEFAULT_IP_ECHO_URL)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyCheckError::NoProxies));
    }
}

//! Dual-IP connectivity checking
//!
//! Fetches the externally observed IP twice: once directly and once through
//! the supervised local SOCKS5 listener. A proxy that is routing traffic
//! makes the two observations differ.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use tracing::debug;

use crate::error::{CheckStage, CheckerError, Result};

/// Performs the direct and proxied IP lookups
#[derive(Debug, Clone)]
pub struct ConnectivityChecker {
    check_url: String,
    direct: reqwest::Client,
    timeout: Duration,
}

impl ConnectivityChecker {
    /// Create a checker against the given IP echo service.
    ///
    /// The direct client is pinned to IPv4 so that both lookups observe the
    /// same address family.
    pub fn new(check_url: String, timeout: Duration) -> Result<Self> {
        let direct = reqwest::Client::builder()
            .timeout(timeout)
            .local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .build()?;

        Ok(Self {
            check_url,
            direct,
            timeout,
        })
    }

    /// Fetch the caller's IP without any proxy
    pub async fn source_ip(&self) -> Result<String> {
        self.fetch_ip(&self.direct, CheckStage::Direct).await
    }

    /// Fetch the caller's IP through the given SOCKS5 proxy URL
    pub async fn proxied_ip(&self, proxy_url: &str) -> Result<String> {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| CheckerError::Network {
            stage: CheckStage::Proxied,
            message: format!("invalid proxy address {}: {}", proxy_url, e),
        })?;
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .proxy(proxy)
            .build()?;

        self.fetch_ip(&client, CheckStage::Proxied).await
    }

    async fn fetch_ip(&self, client: &reqwest::Client, stage: CheckStage) -> Result<String> {
        let response = client
            .get(&self.check_url)
            .send()
            .await
            .map_err(|e| CheckerError::Network {
                stage,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CheckerError::Network {
                stage,
                message: format!("unexpected status {}", status),
            });
        }

        let body = response.text().await.map_err(|e| CheckerError::Network {
            stage,
            message: format!("cannot read body: {}", e),
        })?;

        let ip = body.trim().to_string();
        debug!(stage = %stage, ip = %ip, "IP lookup complete");
        Ok(ip)
    }

    /// Whether the two observed IPs differ (case/whitespace-normalized).
    /// Equal IPs mean the proxy is not routing; nothing to report.
    pub fn ips_differ(source_ip: &str, proxied_ip: &str) -> bool {
        !source_ip.trim().eq_ignore_ascii_case(proxied_ip.trim())
    }
}

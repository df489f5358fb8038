use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CheckerError, Result};

/// Outcome classification of one connectivity check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// Proxy is routing and the monitor was notified
    Success,
    /// Proxy is routing but notifying the monitor failed
    ReportFailed,
    /// Observed IPs match; nothing to report
    Skipped,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Success => "success",
            CheckStatus::ReportFailed => "report_failed",
            CheckStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one check-cycle run against one endpoint.
///
/// Produced by the worker that ran the pipeline, handed to the reporting
/// provider, logged and discarded. Never persisted.
#[derive(Debug, Clone)]
pub struct ConnectivityResult {
    pub config_file: String,
    pub source_ip: String,
    pub proxied_ip: String,
    pub monitor_link: String,
    pub status: CheckStatus,
    pub error: Option<String>,
}

/// Local inbound listener of a generated runtime config
#[derive(Debug, Clone, Deserialize)]
pub struct InboundConfig {
    pub listen: String,
    pub port: u16,
    pub protocol: String,
}

/// Read-back model for a generated runtime proxy configuration.
///
/// Only the fields the pipeline needs are modeled; the outbound definition
/// stays opaque to the checker and is owned by the template.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeProxyConfig {
    pub inbounds: Vec<InboundConfig>,
    pub webhook: String,
}

impl RuntimeProxyConfig {
    /// Load a generated runtime config from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: RuntimeProxyConfig = serde_json::from_str(&raw)?;
        if config.webhook.trim().is_empty() {
            return Err(CheckerError::InvalidRuntimeConfig(
                "webhook URL is missing".to_string(),
            ));
        }
        Ok(config)
    }

    /// The local inbound listener the engine binds for this endpoint
    pub fn local_inbound(&self) -> Result<&InboundConfig> {
        self.inbounds.first().ok_or_else(|| {
            CheckerError::InvalidRuntimeConfig("no inbound listener defined".to_string())
        })
    }

    /// SOCKS5 proxy URL for the local inbound
    pub fn proxy_url(&self) -> Result<String> {
        let inbound = self.local_inbound()?;
        Ok(format!("socks5://{}:{}", inbound.listen, inbound.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_check_status_display() {
        assert_eq!(CheckStatus::Success.to_string(), "success");
        assert_eq!(CheckStatus::ReportFailed.to_string(), "report_failed");
        assert_eq!(CheckStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_runtime_config_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "inbounds": [{{"listen": "127.0.0.1", "port": 10000, "protocol": "socks"}}],
                "outbounds": [{{"protocol": "vless"}}],
                "webhook": "https://kuma.example/api/push/abc"
            }}"#
        )
        .unwrap();

        let config = RuntimeProxyConfig::load(file.path()).unwrap();
        assert_eq!(config.webhook, "https://kuma.example/api/push/abc");
        assert_eq!(config.proxy_url().unwrap(), "socks5://127.0.0.1:10000");

        let inbound = config.local_inbound().unwrap();
        assert_eq!(inbound.protocol, "socks");
        assert_eq!(inbound.port, 10000);
    }

    #[test]
    fn test_runtime_config_rejects_missing_webhook() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "inbounds": [{{"listen": "127.0.0.1", "port": 10000, "protocol": "socks"}}],
                "webhook": ""
            }}"#
        )
        .unwrap();

        let err = RuntimeProxyConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, CheckerError::InvalidRuntimeConfig(_)));
    }

    #[test]
    fn test_runtime_config_rejects_no_inbounds() {
        let config = RuntimeProxyConfig {
            inbounds: vec![],
            webhook: "https://kuma.example/api/push/abc".to_string(),
        };
        assert!(config.local_inbound().is_err());
        assert!(config.proxy_url().is_err());
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{CheckerError, Result};

/// Process-level settings loaded from environment variables
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the program configuration file (default: ./config.json)
    pub program_config: PathBuf,
    /// Directory holding one template per protocol family (default: ./templates)
    pub template_dir: PathBuf,
    /// Directory where generated runtime configs are written (default: ./configs)
    pub output_dir: PathBuf,
    /// Name or path of the xray binary (default: xray)
    pub xray_binary: String,
    /// Maximum time to wait for the engine's local listener to accept connections
    pub readiness_timeout: Duration,
    /// Timeout applied to each IP lookup and webhook request
    pub http_timeout: Duration,
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        let readiness_secs: u64 = get_env_or("XRAY_CHECKER_READINESS_TIMEOUT", "10")
            .parse()
            .map_err(|_| {
                CheckerError::InvalidConfig(
                    "XRAY_CHECKER_READINESS_TIMEOUT must be a number of seconds".into(),
                )
            })?;
        let http_secs: u64 = get_env_or("XRAY_CHECKER_HTTP_TIMEOUT", "20")
            .parse()
            .map_err(|_| {
                CheckerError::InvalidConfig(
                    "XRAY_CHECKER_HTTP_TIMEOUT must be a number of seconds".into(),
                )
            })?;

        if readiness_secs == 0 {
            return Err(CheckerError::InvalidConfig(
                "XRAY_CHECKER_READINESS_TIMEOUT must be at least 1".into(),
            ));
        }
        if http_secs == 0 {
            return Err(CheckerError::InvalidConfig(
                "XRAY_CHECKER_HTTP_TIMEOUT must be at least 1".into(),
            ));
        }

        Ok(Settings {
            program_config: PathBuf::from(get_env_or("XRAY_CHECKER_CONFIG", "./config.json")),
            template_dir: PathBuf::from(get_env_or("XRAY_CHECKER_TEMPLATES", "./templates")),
            output_dir: PathBuf::from(get_env_or("XRAY_CHECKER_OUTPUT", "./configs")),
            xray_binary: get_env_or("XRAY_CHECKER_XRAY_BIN", "xray"),
            readiness_timeout: Duration::from_secs(readiness_secs),
            http_timeout: Duration::from_secs(http_secs),
        })
    }
}

/// Top-level program configuration document
#[derive(Debug, Clone, Deserialize)]
pub struct ProgramConfig {
    pub provider: ProviderConfig,
}

impl ProgramConfig {
    /// Load and validate the program configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref()).map_err(|e| {
            CheckerError::InvalidConfig(format!(
                "cannot read program config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: ProgramConfig = serde_json::from_str(&raw).map_err(|e| {
            CheckerError::InvalidConfig(format!("cannot parse program config: {}", e))
        })?;
        config.provider.validate()?;
        Ok(config)
    }
}

/// Reporting provider configuration, including the monitored endpoints.
/// Loaded once at startup and immutable for the process lifetime.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Discriminant resolved against the provider registry
    pub name: String,
    /// First local SOCKS5 port; endpoint i gets proxy_start_port + i
    pub proxy_start_port: u16,
    /// Seconds between check cycles
    pub interval: u64,
    /// Number of long-lived check workers
    pub workers: usize,
    /// URL returning the caller's external IP as plain text
    pub check_service: String,
    /// Monitored endpoints in declared order
    pub configs: Vec<EndpointConfig>,
}

/// One monitored endpoint: a proxy link plus its monitor URL
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub link: String,
    pub monitor_link: String,
}

impl ProviderConfig {
    /// Validate the configuration; called once at load time
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CheckerError::InvalidConfig(
                "provider name must not be empty".into(),
            ));
        }
        if self.workers == 0 {
            return Err(CheckerError::InvalidConfig(
                "workers must be at least 1".into(),
            ));
        }
        if self.interval == 0 {
            return Err(CheckerError::InvalidConfig(
                "interval must be at least 1 second".into(),
            ));
        }
        if self.proxy_start_port == 0 {
            return Err(CheckerError::InvalidConfig(
                "proxyStartPort must be greater than 0".into(),
            ));
        }
        if self.configs.is_empty() {
            return Err(CheckerError::InvalidConfig(
                "at least one endpoint config is required".into(),
            ));
        }
        if self.proxy_start_port as usize + self.configs.len() > u16::MAX as usize + 1 {
            return Err(CheckerError::InvalidConfig(format!(
                "proxyStartPort {} leaves no room for {} endpoints",
                self.proxy_start_port,
                self.configs.len()
            )));
        }
        Url::parse(&self.check_service).map_err(|e| {
            CheckerError::InvalidConfig(format!("checkService must be a valid URL: {}", e))
        })?;
        Ok(())
    }

    /// Local port allocated to the endpoint at the given declared index
    pub fn local_port_for(&self, index: usize) -> Result<u16> {
        u16::try_from(self.proxy_start_port as usize + index).map_err(|_| {
            CheckerError::InvalidConfig(format!(
                "local port allocation overflows for endpoint index {}",
                index
            ))
        })
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

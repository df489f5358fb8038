//! Uptime-Kuma push provider
//!
//! Notifies an Uptime-Kuma instance through its push monitor URL: a plain
//! GET with no body or headers. Delivery success is defined purely as the
//! absence of a transport error; the status code is not inspected.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::error::{CheckerError, Result};
use crate::models::{CheckStatus, ConnectivityResult};
use crate::providers::ReportingProvider;

pub const PROVIDER_NAME: &str = "uptime-kuma";

const REPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Reporting provider for Uptime-Kuma push monitors
pub struct UptimeKumaProvider {
    client: reqwest::Client,
}

impl UptimeKumaProvider {
    pub fn from_config(_config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REPORT_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ReportingProvider for UptimeKumaProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn process_results(&self, result: &mut ConnectivityResult) -> Result<()> {
        if result.status == CheckStatus::Skipped {
            info!(
                config = %result.config_file,
                "IP addresses match, status not sent"
            );
            return Ok(());
        }

        match self.client.get(&result.monitor_link).send().await {
            Ok(response) => {
                result.status = CheckStatus::Success;
                debug!(
                    config = %result.config_file,
                    status = %response.status(),
                    "push monitor notified"
                );
                Ok(())
            }
            Err(e) => {
                result.status = CheckStatus::ReportFailed;
                Err(CheckerError::ReportFailed(e.to_string()))
            }
        }
    }
}

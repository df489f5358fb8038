//! Per-job check pipeline
//!
//! One job = one generated runtime config: start the engine, wait for its
//! listener, look up both IPs, classify, report, and always stop the engine.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::checker::ConnectivityChecker;
use crate::error::Result;
use crate::models::{CheckStatus, ConnectivityResult, RuntimeProxyConfig};
use crate::providers::ReportingProvider;
use crate::supervisor::{ProcessHandle, ProcessSupervisor};

/// Unit of work executed by a scheduler worker.
///
/// The seam exists so the worker pool can be exercised without spawning
/// proxy engines.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run one job to completion; all failures are handled internally
    async fn run(&self, config_path: &Path);
}

/// The production pipeline: supervise, check, report
pub struct CheckPipeline {
    supervisor: ProcessSupervisor,
    checker: ConnectivityChecker,
    provider: Arc<dyn ReportingProvider>,
}

impl CheckPipeline {
    pub fn new(
        supervisor: ProcessSupervisor,
        checker: ConnectivityChecker,
        provider: Arc<dyn ReportingProvider>,
    ) -> Self {
        Self {
            supervisor,
            checker,
            provider,
        }
    }

    async fn execute(&self, config_path: &Path) -> Result<ConnectivityResult> {
        let runtime = RuntimeProxyConfig::load(config_path)?;
        let proxy_url = runtime.proxy_url()?;
        let inbound = runtime.local_inbound()?.clone();

        let source_ip = self.checker.source_ip().await?;

        let mut handle = self.supervisor.start(config_path).await?;
        // Once the engine is up, every exit path below must pass through stop.
        let proxied = self
            .proxied_lookup(&mut handle, &inbound.listen, inbound.port, &proxy_url)
            .await;
        self.supervisor.stop(handle).await;
        let proxied_ip = proxied?;

        let status = if ConnectivityChecker::ips_differ(&source_ip, &proxied_ip) {
            CheckStatus::Success
        } else {
            CheckStatus::Skipped
        };

        let mut result = ConnectivityResult {
            config_file: config_path.display().to_string(),
            source_ip,
            proxied_ip,
            monitor_link: runtime.webhook,
            status,
            error: None,
        };

        // Delivery failure downgrades the result but never fails the job.
        if let Err(e) = self.provider.process_results(&mut result).await {
            result.error = Some(e.to_string());
        }

        Ok(result)
    }

    async fn proxied_lookup(
        &self,
        handle: &mut ProcessHandle,
        listen: &str,
        port: u16,
        proxy_url: &str,
    ) -> Result<String> {
        self.supervisor.wait_ready(handle, listen, port).await?;
        self.checker.proxied_ip(proxy_url).await
    }

    fn log_result(result: &ConnectivityResult) {
        match &result.error {
            Some(e) => warn!(
                config = %result.config_file,
                source_ip = %result.source_ip,
                proxied_ip = %result.proxied_ip,
                status = %result.status,
                "check completed with report error: {}", e
            ),
            None => info!(
                config = %result.config_file,
                source_ip = %result.source_ip,
                proxied_ip = %result.proxied_ip,
                status = %result.status,
                "check completed"
            ),
        }
    }
}

#[async_trait]
impl JobRunner for CheckPipeline {
    async fn run(&self, config_path: &Path) {
        match self.execute(config_path).await {
            Ok(result) => Self::log_result(&result),
            // Worker boundary: the failure terminates this job only; the
            // next cycle re-enumerates and retries implicitly.
            Err(e) => error!(config = %config_path.display(), "check failed: {}", e),
        }
    }
}

//! Reporting providers
//!
//! A provider delivers classified check results to an external monitoring
//! system. Implementations are resolved by discriminant name through the
//! registry; an unknown name is a startup error, not a runtime surprise.

pub mod uptime_kuma;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ProviderConfig;
use crate::error::{CheckerError, Result};
use crate::models::ConnectivityResult;

pub use uptime_kuma::UptimeKumaProvider;

/// Capability interface for monitoring backends.
///
/// Called exactly once per pipeline run that reached classification; runs
/// that fail earlier never produce a result to report.
#[async_trait]
pub trait ReportingProvider: Send + Sync {
    /// Discriminant name this provider registers under
    fn name(&self) -> &str;

    /// Deliver one classified result, finalizing its status
    async fn process_results(&self, result: &mut ConnectivityResult) -> Result<()>;
}

type ProviderFactory =
    Box<dyn Fn(&ProviderConfig) -> Result<Arc<dyn ReportingProvider>> + Send + Sync>;

/// Maps provider discriminant names to factories
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with all built-in providers registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(uptime_kuma::PROVIDER_NAME, |config| {
            Ok(Arc::new(UptimeKumaProvider::from_config(config)?))
        });
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ProviderConfig) -> Result<Arc<dyn ReportingProvider>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Instantiate the provider registered under `name`
    pub fn create(
        &self,
        name: &str,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn ReportingProvider>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| CheckerError::UnknownProvider(name.to_string()))?;
        factory(config)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;

    fn sample_provider_config() -> ProviderConfig {
        ProviderConfig {
            name: "uptime-kuma".to_string(),
            proxy_start_port: 10000,
            interval: 60,
            workers: 1,
            check_service: "https://ifconfig.io".to_string(),
            configs: vec![EndpointConfig {
                link: "vless://uid@example.com:443#n".to_string(),
                monitor_link: "https://kuma.example/api/push/abc".to_string(),
            }],
        }
    }

    #[test]
    fn test_registry_resolves_builtin() {
        let registry = ProviderRegistry::with_builtins();
        let provider = registry
            .create("uptime-kuma", &sample_provider_config())
            .unwrap();
        assert_eq!(provider.name(), "uptime-kuma");
    }

    #[test]
    fn test_registry_rejects_unknown_name() {
        let registry = ProviderRegistry::with_builtins();
        let err = registry
            .create("pagerduty", &sample_provider_config())
            .map(|provider| provider.name().to_string())
            .unwrap_err();
        assert!(matches!(err, CheckerError::UnknownProvider(_)));
    }
}

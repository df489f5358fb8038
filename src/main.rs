//! xray-checker - Entry Point
//!
//! Loads configuration, materializes runtime configs for every declared
//! endpoint, then runs the check scheduler until a shutdown signal arrives.

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xray_checker::checker::ConnectivityChecker;
use xray_checker::config::{ProgramConfig, Settings};
use xray_checker::error::{CheckerError, Result};
use xray_checker::generator::ConfigGenerator;
use xray_checker::link::parse_link;
use xray_checker::pipeline::CheckPipeline;
use xray_checker::providers::ProviderRegistry;
use xray_checker::scheduler::{Scheduler, SchedulerConfig, SchedulerHandle};
use xray_checker::supervisor::ProcessSupervisor;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xray_checker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting xray-checker");

    let settings = Settings::from_env()?;
    fs::create_dir_all(&settings.output_dir)?;

    let program = ProgramConfig::load(&settings.program_config)?;
    let provider_config = program.provider;
    info!(
        provider = %provider_config.name,
        endpoints = provider_config.configs.len(),
        "Configuration loaded"
    );

    // Unknown provider names fail here, before anything is scheduled.
    let registry = ProviderRegistry::with_builtins();
    let provider = registry.create(&provider_config.name, &provider_config)?;

    // Materialize one runtime config per endpoint. Any failure aborts
    // startup: no partial endpoint set is ever scheduled.
    let generator = ConfigGenerator::new(
        settings.template_dir.clone(),
        settings.output_dir.clone(),
    );
    let mut seen_links = HashSet::new();
    for (index, endpoint_config) in provider_config.configs.iter().enumerate() {
        if !seen_links.insert(endpoint_config.link.clone()) {
            return Err(CheckerError::DuplicateEndpoint(
                endpoint_config.link.clone(),
            ));
        }

        let mut endpoint = parse_link(&endpoint_config.link)?;
        endpoint.monitor_link = endpoint_config.monitor_link.clone();
        endpoint.allocated_local_port = provider_config.local_port_for(index)?;

        let path = generator.generate(&endpoint)?;
        info!(
            endpoint = %endpoint.display_name,
            local_port = endpoint.allocated_local_port,
            config = %path.display(),
            "Runtime config generated"
        );
    }

    let supervisor = ProcessSupervisor::new(
        settings.xray_binary.clone(),
        settings.readiness_timeout,
    );
    let checker = ConnectivityChecker::new(
        provider_config.check_service.clone(),
        settings.http_timeout,
    )?;
    let pipeline = Arc::new(CheckPipeline::new(supervisor, checker, provider));

    let scheduler = Scheduler::new(
        SchedulerConfig {
            interval: Duration::from_secs(provider_config.interval),
            workers: provider_config.workers,
            output_dir: settings.output_dir.clone(),
        },
        pipeline,
    );

    let (scheduler_handle, shutdown_rx) = SchedulerHandle::new();
    let scheduler_task = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    scheduler_handle.shutdown();
    let _ = scheduler_task.await;

    info!("xray-checker stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

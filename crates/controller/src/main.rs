//! CPU Autoscaler - horizontal scaling controller
//!
//! Periodically samples the CPU utilization of every deployment with a
//! registered policy and adjusts its replica count through the Kubernetes API.

use anyhow::{Context, Result};
use autoscaler_lib::{
    cluster::KubeApiClient,
    health::{components, HealthRegistry},
    observability::{AutoscalerMetrics, StructuredLogger},
    registry::StatusRegistry,
    scheduler::SchedulerLoopBuilder,
};
use cpu_autoscaler::{api, config::ControllerConfig};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AUTOSCALER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = ControllerConfig::load()?;
    info!(
        api_port = config.api_port,
        kube_api_url = %config.kube_api_url,
        tick_interval_secs = config.tick_interval_secs,
        "Autoscaler configured"
    );

    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(AUTOSCALER_VERSION, &config.kube_api_url);

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SCHEDULER).await;
    health_registry.register(components::KUBE_API).await;

    let metrics = AutoscalerMetrics::new();
    let registry = StatusRegistry::new();

    let kube = Arc::new(
        KubeApiClient::new(&config.kube_api_url, config.request_timeout())
            .context("Failed to create Kubernetes API client")?,
    );

    let scheduler = SchedulerLoopBuilder::new()
        .registry(registry.clone())
        .directory(kube.clone())
        .metrics_source(kube.clone())
        .scaler(kube)
        .health(health_registry.clone())
        .logger(logger.clone())
        .interval(config.tick_interval())
        .jitter(config.tick_jitter())
        .build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    let app_state = Arc::new(api::AppState::new(
        registry,
        health_registry.clone(),
        metrics,
        logger.clone(),
    ));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    health_registry.set_ready(true).await;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    logger.log_shutdown("API server failed");
                }
                Err(e) => {
                    error!(error = %e, "API server task panicked");
                    logger.log_shutdown("API server task panicked");
                }
            }
        }
    }

    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    if let Err(e) = scheduler_handle.await {
        error!(error = %e, "Scheduler task panicked");
    }

    info!("Shutting down");
    Ok(())
}

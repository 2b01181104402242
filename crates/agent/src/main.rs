//! Usage log - Kubernetes inventory snapshots for accounting
//!
//! This binary periodically lists namespaces, pods, resource quotas and
//! nodes, and writes one JSON snapshot per tick into monthly partitions.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use usage_lib::{
    catalog::{CatalogLoopBuilder, ClusterReader, KubeClusterReader, PartitionedWriter},
    health::{components, HealthRegistry},
    observability::StructuredLogger,
};

mod api;
mod config;

const USAGE_LOG_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = config::Cli::parse();
    let config = config::AgentConfig::load(&cli)?;
    info!(
        cluster_id = %config.cluster_id,
        internal = config.internal,
        "Usage log configured"
    );

    let reader = cluster_reader(&config).await?;
    let writer = Arc::new(PartitionedWriter::new(&config.destination_path));

    let health_registry = HealthRegistry::new();
    health_registry.register(components::CATALOG).await;
    health_registry.register(components::CLUSTER_READER).await;
    health_registry.register(components::WRITER).await;

    let logger = StructuredLogger::new(&config.cluster_id);
    logger.log_startup(
        USAGE_LOG_VERSION,
        config.usage_period,
        &config.destination_path,
    );

    let (catalog_loop, _state_rx) = CatalogLoopBuilder::new()
        .reader(reader)
        .writer(writer)
        .health(health_registry.clone())
        .cluster_id(&config.cluster_id)
        .period(config.period())
        .build()?;

    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let api_handle = api::spawn(config.api_port, app_state);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let catalog_handle = tokio::spawn(catalog_loop.run(shutdown_rx));
    health_registry.set_ready(true).await;

    let reason = shutdown_signal().await?;
    logger.log_shutdown(reason);
    health_registry.set_ready(false).await;

    // A send error means the loop already exited
    let _ = shutdown_tx.send(());
    if let Err(e) = catalog_handle.await {
        error!(error = %e, "Catalog loop task failed");
    }
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

/// Build the cluster reader from in-cluster credentials or a kubeconfig
async fn cluster_reader(config: &config::AgentConfig) -> Result<Arc<dyn ClusterReader>> {
    let reader = if config.internal {
        KubeClusterReader::in_cluster().context("Failed to create cluster reader")?
    } else {
        let path = config.kubeconfig_path()?;
        info!(kubeconfig = %path.display(), "Using kubeconfig");
        KubeClusterReader::from_kubeconfig(&path)
            .await
            .with_context(|| format!("Failed to load kubeconfig {}", path.display()))?
    };
    Ok(Arc::new(reader))
}

/// Wait for SIGINT, or SIGTERM on unix
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok("SIGINT received")
            }
            _ = terminate.recv() => Ok("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("SIGINT received")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn agent_config(internal: bool, kubeconfig: Option<PathBuf>) -> config::AgentConfig {
        config::AgentConfig {
            cluster_id: "east-1".to_string(),
            usage_period: 60,
            destination_path: PathBuf::from("logs/"),
            internal,
            kubeconfig,
            api_port: 8080,
        }
    }

    #[tokio::test]
    async fn test_in_cluster_failure_is_labelled_once() {
        if std::env::var_os("KUBERNETES_SERVICE_HOST").is_some() {
            return;
        }

        let err = cluster_reader(&agent_config(true, None))
            .await
            .err()
            .expect("in-cluster credentials are unavailable here");
        let chain = format!("{err:#}");
        assert!(chain.starts_with("Failed to create cluster reader"));
        assert_eq!(chain.matches("Failed to load in-cluster configuration").count(), 1);
    }

    #[tokio::test]
    async fn test_missing_kubeconfig_fails() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let missing = temp_dir.path().join("kubeconfig");

        let err = cluster_reader(&agent_config(false, Some(missing)))
            .await
            .err()
            .expect("kubeconfig does not exist");
        let chain = format!("{err:#}");
        assert!(chain.contains("Failed to read kubeconfig"));
    }
}

//! Snapshot scheduling loop
//!
//! Runs fetch, aggregate and write once per tick, then sleeps for the
//! configured period. The period is measured from the end of one tick to the
//! start of the next, so the tick-to-tick interval grows with tick latency.

use super::{audit_cluster, Audit, ClusterReader, PartitionedWriter, WriteError};
use crate::health::{components, HealthRegistry};
use crate::models::Snapshot;
use crate::observability::{StructuredLogger, UsageMetrics};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Configuration for the catalog loop
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Identifier written into every snapshot and file name
    pub cluster_id: String,
    /// Sleep between the end of one tick and the start of the next (default: 60 seconds)
    pub period: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            cluster_id: String::new(),
            period: Duration::from_secs(60),
        }
    }
}

/// Scheduler state, observable through the receiver returned by [`CatalogLoop::new`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Sleeping between ticks
    Idle,
    /// Fetch, aggregate and write in progress
    Running,
    Stopped,
}

/// Catalog loop that periodically snapshots the cluster
pub struct CatalogLoop {
    reader: Arc<dyn ClusterReader>,
    writer: Arc<PartitionedWriter>,
    config: CatalogConfig,
    state_tx: watch::Sender<SchedulerState>,
    /// Start time of the previous tick
    last_tick: DateTime<Utc>,
    metrics: UsageMetrics,
    health: Option<HealthRegistry>,
    logger: StructuredLogger,
}

impl CatalogLoop {
    /// Create a new catalog loop
    pub fn new(
        reader: Arc<dyn ClusterReader>,
        writer: Arc<PartitionedWriter>,
        config: CatalogConfig,
    ) -> (Self, watch::Receiver<SchedulerState>) {
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);
        let logger = StructuredLogger::new(&config.cluster_id);

        let loop_instance = Self {
            reader,
            writer,
            config,
            state_tx,
            last_tick: Utc::now(),
            metrics: UsageMetrics::new(),
            health: None,
            logger,
        };

        (loop_instance, state_rx)
    }

    /// Run until a shutdown signal arrives
    ///
    /// The first tick fires immediately. A signal received while a tick is in
    /// flight abandons that tick; a signal received while sleeping ends the
    /// sleep at once. A closed shutdown channel counts as a signal.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            cluster_id = %self.config.cluster_id,
            period_secs = self.config.period.as_secs(),
            "Starting catalog loop"
        );

        let mut tick_count = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Shutdown received during tick, abandoning it");
                    break;
                }
                _ = self.tick() => {
                    tick_count += 1;
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = sleep(self.config.period) => {}
            }
        }

        self.state_tx.send_replace(SchedulerState::Stopped);
        if let Some(health) = &self.health {
            health.set_unhealthy(components::CATALOG, "catalog loop stopped").await;
        }
        info!(ticks = tick_count, "Shutting down catalog loop");
    }

    /// Take one snapshot and write it
    ///
    /// Returns the written path. Write failures are logged and counted here;
    /// the caller only needs the result for reporting.
    pub async fn tick(&mut self) -> Result<PathBuf, WriteError> {
        self.state_tx.send_replace(SchedulerState::Running);
        let timer = Instant::now();

        let audit = self.take_snapshot().await;
        self.record_audit(&audit).await;

        let snapshot = audit.snapshot;
        let result = self.writer.write(&snapshot, &self.config.cluster_id).await;
        let elapsed = timer.elapsed();
        self.metrics.observe_snapshot_duration(elapsed.as_secs_f64());

        match &result {
            Ok(path) => {
                self.metrics.inc_snapshots_written();
                self.logger.log_snapshot_written(
                    path,
                    snapshot.namespaces.len(),
                    snapshot.pod_count(),
                    snapshot.nodes.len(),
                    snapshot.success,
                    elapsed.as_millis(),
                );
                if let Some(health) = &self.health {
                    health.set_healthy(components::WRITER).await;
                    health.record_snapshot(&snapshot.time).await;
                }
            }
            Err(e) => {
                self.metrics.inc_write_errors();
                self.logger.log_snapshot_failed("write", &error_chain(e));
                if let Some(health) = &self.health {
                    health.set_degraded(components::WRITER, e.to_string()).await;
                }
            }
        }

        self.state_tx.send_replace(SchedulerState::Idle);
        result
    }

    /// Audit the cluster and stamp the snapshot with its timing fields
    pub async fn take_snapshot(&mut self) -> Audit {
        let started = Utc::now();
        let mut audit = audit_cluster(self.reader.as_ref(), &self.config.cluster_id).await;

        stamp(&mut audit.snapshot, started, self.last_tick);
        self.last_tick = started;

        debug!(
            time = %audit.snapshot.time,
            duration = audit.snapshot.duration,
            success = audit.snapshot.success,
            "Snapshot assembled"
        );
        audit
    }

    /// Update metrics and health from the fetch and aggregation outcome
    async fn record_audit(&self, audit: &Audit) {
        match &audit.fetch_error {
            Some(e) => {
                self.metrics.inc_fetch_errors();
                self.logger.log_snapshot_failed("fetch", &e.to_string());
                if let Some(health) = &self.health {
                    health.set_degraded(components::CLUSTER_READER, e.to_string()).await;
                }
            }
            None => {
                let snapshot = &audit.snapshot;
                self.metrics.set_inventory(
                    snapshot.namespaces.len() as i64,
                    snapshot.pod_count() as i64,
                    snapshot.nodes.len() as i64,
                );
                self.metrics
                    .add_aggregation_errors(audit.aggregation_errors.len() as u64);
                if let Some(health) = &self.health {
                    health.set_healthy(components::CLUSTER_READER).await;
                }
            }
        }
    }
}

/// Set the snapshot time and the seconds elapsed since the previous tick start
fn stamp(snapshot: &mut Snapshot, started: DateTime<Utc>, previous: DateTime<Utc>) {
    snapshot.time = started.to_rfc3339_opts(SecondsFormat::Millis, true);
    snapshot.duration = (started - previous)
        .to_std()
        .unwrap_or_default()
        .as_secs_f64();
}

/// Render an error with its sources, e.g. `failed to write ...: permission denied`
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Builder for creating the catalog loop
pub struct CatalogLoopBuilder {
    reader: Option<Arc<dyn ClusterReader>>,
    writer: Option<Arc<PartitionedWriter>>,
    health: Option<HealthRegistry>,
    config: CatalogConfig,
}

impl CatalogLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            reader: None,
            writer: None,
            health: None,
            config: CatalogConfig::default(),
        }
    }

    pub fn reader(mut self, reader: Arc<dyn ClusterReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn writer(mut self, writer: Arc<PartitionedWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Report component health to this registry
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        self.config.cluster_id = cluster_id.into();
        self
    }

    pub fn period(mut self, period: Duration) -> Self {
        self.config.period = period;
        self
    }

    /// Build the catalog loop
    pub fn build(self) -> Result<(CatalogLoop, watch::Receiver<SchedulerState>)> {
        let reader = self
            .reader
            .ok_or_else(|| anyhow::anyhow!("Cluster reader is required"))?;
        let writer = self
            .writer
            .ok_or_else(|| anyhow::anyhow!("Writer is required"))?;
        if self.config.cluster_id.is_empty() {
            anyhow::bail!("Cluster id is required");
        }
        if self.config.period.is_zero() {
            anyhow::bail!("Period must be greater than zero");
        }

        let (mut catalog_loop, state_rx) = CatalogLoop::new(reader, writer, self.config);
        catalog_loop.health = self.health;
        Ok((catalog_loop, state_rx))
    }
}

impl Default for CatalogLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_catalog_config_default() {
        let config = CatalogConfig::default();
        assert_eq!(config.period, Duration::from_secs(60));
        assert!(config.cluster_id.is_empty());
    }

    #[test]
    fn test_stamp_measures_from_previous_start() {
        let previous = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        let started = previous + chrono::Duration::milliseconds(61_500);
        let mut snapshot = Snapshot::default();

        stamp(&mut snapshot, started, previous);

        assert_eq!(snapshot.time, "2024-03-05T12:01:01.500Z");
        assert!((snapshot.duration - 61.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let error = WriteError::Write {
            path: PathBuf::from("/logs/a.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            error_chain(&error),
            "failed to write snapshot file /logs/a.json: denied"
        );
    }

    #[test]
    fn test_stamp_clamps_clock_going_backwards() {
        let previous = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        let started = previous - chrono::Duration::seconds(5);
        let mut snapshot = Snapshot::default();

        stamp(&mut snapshot, started, previous);
        assert_eq!(snapshot.duration, 0.0);
    }
}

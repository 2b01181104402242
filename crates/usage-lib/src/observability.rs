//! Observability infrastructure for the usage log
//!
//! Provides:
//! - Prometheus metrics (snapshot latency, error counters, inventory sizes)
//! - Structured JSON logging of catalog events with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter,
    IntGauge,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for snapshot latency (in seconds)
///
/// A snapshot lists the whole cluster, so latencies run far longer than a
/// single request.
const SNAPSHOT_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<UsageMetricsInner> = OnceLock::new();

struct UsageMetricsInner {
    snapshot_duration_seconds: Histogram,
    snapshots_written: IntCounter,
    fetch_errors: IntCounter,
    aggregation_errors: IntCounter,
    write_errors: IntCounter,
    namespaces: IntGauge,
    pods: IntGauge,
    nodes: IntGauge,
}

impl UsageMetricsInner {
    fn new() -> Self {
        Self {
            snapshot_duration_seconds: register_histogram!(
                "usage_log_snapshot_duration_seconds",
                "Time spent fetching, aggregating and writing one snapshot",
                SNAPSHOT_BUCKETS.to_vec()
            )
            .expect("Failed to register snapshot_duration_seconds"),

            snapshots_written: register_int_counter!(
                "usage_log_snapshots_written_total",
                "Total number of snapshot files written"
            )
            .expect("Failed to register snapshots_written"),

            fetch_errors: register_int_counter!(
                "usage_log_fetch_errors_total",
                "Total number of ticks whose inventory fetch failed"
            )
            .expect("Failed to register fetch_errors"),

            aggregation_errors: register_int_counter!(
                "usage_log_aggregation_errors_total",
                "Total number of items that could not be attached to a namespace"
            )
            .expect("Failed to register aggregation_errors"),

            write_errors: register_int_counter!(
                "usage_log_write_errors_total",
                "Total number of snapshot write failures"
            )
            .expect("Failed to register write_errors"),

            namespaces: register_int_gauge!(
                "usage_log_namespaces",
                "Namespaces in the most recent successful fetch"
            )
            .expect("Failed to register namespaces"),

            pods: register_int_gauge!(
                "usage_log_pods",
                "Pods attached in the most recent successful fetch"
            )
            .expect("Failed to register pods"),

            nodes: register_int_gauge!(
                "usage_log_nodes",
                "Nodes in the most recent successful fetch"
            )
            .expect("Failed to register nodes"),
        }
    }
}

/// Usage log metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct UsageMetrics {
    _private: (),
}

impl Default for UsageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(UsageMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &UsageMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_snapshot_duration(&self, duration_secs: f64) {
        self.inner().snapshot_duration_seconds.observe(duration_secs);
    }

    pub fn inc_snapshots_written(&self) {
        self.inner().snapshots_written.inc();
    }

    pub fn inc_fetch_errors(&self) {
        self.inner().fetch_errors.inc();
    }

    pub fn add_aggregation_errors(&self, count: u64) {
        self.inner().aggregation_errors.inc_by(count);
    }

    pub fn inc_write_errors(&self) {
        self.inner().write_errors.inc();
    }

    /// Update inventory size gauges
    pub fn set_inventory(&self, namespaces: i64, pods: i64, nodes: i64) {
        self.inner().namespaces.set(namespaces);
        self.inner().pods.set(pods);
        self.inner().nodes.set(nodes);
    }

    pub fn snapshots_written(&self) -> u64 {
        self.inner().snapshots_written.get()
    }

    pub fn write_errors(&self) -> u64 {
        self.inner().write_errors.get()
    }
}

/// Structured logger for catalog events
///
/// Every event carries the cluster id so that logs from several clusters
/// can share one sink.
#[derive(Clone)]
pub struct StructuredLogger {
    cluster_id: String,
}

impl StructuredLogger {
    pub fn new(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
        }
    }

    /// Log process startup
    pub fn log_startup(&self, version: &str, period_secs: u64, destination: &Path) {
        info!(
            event = "catalog_started",
            cluster_id = %self.cluster_id,
            version = %version,
            period_secs = period_secs,
            destination = %destination.display(),
            "Usage log started"
        );
    }

    /// Log a persisted snapshot
    pub fn log_snapshot_written(
        &self,
        path: &Path,
        namespaces: usize,
        pods: usize,
        nodes: usize,
        success: bool,
        elapsed_ms: u128,
    ) {
        info!(
            event = "snapshot_written",
            cluster_id = %self.cluster_id,
            path = %path.display(),
            namespaces = namespaces,
            pods = pods,
            nodes = nodes,
            success = success,
            elapsed_ms = elapsed_ms,
            "Snapshot written"
        );
    }

    /// Log a snapshot that could not be persisted
    pub fn log_snapshot_failed(&self, stage: &str, error: &str) {
        warn!(
            event = "snapshot_failed",
            cluster_id = %self.cluster_id,
            stage = %stage,
            error = %error,
            "Snapshot could not be completed"
        );
    }

    /// Log process shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "catalog_shutdown",
            cluster_id = %self.cluster_id,
            reason = %reason,
            "Usage log shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_metrics_creation() {
        // Metrics live in the global Prometheus registry, so only relative
        // changes are asserted.
        let metrics = UsageMetrics::new();
        let written = metrics.snapshots_written();

        metrics.observe_snapshot_duration(0.4);
        metrics.inc_snapshots_written();
        metrics.inc_fetch_errors();
        metrics.add_aggregation_errors(2);
        metrics.set_inventory(3, 12, 2);

        assert!(metrics.snapshots_written() > written);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("east-1");
        assert_eq!(logger.cluster_id, "east-1");
    }
}

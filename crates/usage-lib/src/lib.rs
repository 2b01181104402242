//! Usage log library for Kubernetes accounting
//!
//! This crate provides the core functionality for:
//! - Reading the cluster inventory (namespaces, pods, quotas, nodes)
//! - Aggregating it into hierarchical snapshots
//! - Writing snapshots into calendar-month partitions on a fixed period
//! - Health checks and observability

pub mod catalog;
pub mod health;
pub mod models;
pub mod observability;

pub use catalog::{
    CatalogConfig, CatalogLoop, CatalogLoopBuilder, ClusterReader, KubeClusterReader,
    PartitionedWriter, SchedulerState,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{StructuredLogger, UsageMetrics};

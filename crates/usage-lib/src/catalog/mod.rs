//! Cluster inventory cataloging
//!
//! This module turns the raw inventory of a cluster into periodic,
//! calendar-partitioned snapshots. A [`ClusterReader`] supplies the four
//! inventory lists, [`aggregate`] builds the snapshot hierarchy, and the
//! [`CatalogLoop`] hands each snapshot to the [`PartitionedWriter`].

mod aggregate;
mod extract;
mod kube_reader;
mod r#loop;
mod quantity;
mod writer;


pub use aggregate::{aggregate, Aggregation, AggregationError, Inventory};
pub use extract::{
    container_record, container_values, extract_quantity, groups, namespace_record,
    node_record, node_values, owner_record, pod_record, quota_record, quota_values,
    ResourceList,
};
pub use kube_reader::KubeClusterReader;
pub use quantity::{parse_quantity, quantity_value};
pub use r#loop::{CatalogConfig, CatalogLoop, CatalogLoopBuilder, SchedulerState};
pub use writer::{partition_dir, partition_period, snapshot_filename, PartitionedWriter, WriteError};

use crate::models::Snapshot;
use anyhow::Result;
use k8s_openapi::api::core::v1 as core;
use thiserror::Error;
use tracing::{debug, warn};

pub use async_trait::async_trait;

/// Trait for reading the cluster inventory
///
/// Implementations own connection and credential handling; the catalog only
/// needs the four list operations.
#[async_trait]
pub trait ClusterReader: Send + Sync {
    async fn list_namespaces(&self) -> Result<Vec<core::Namespace>>;

    /// List pods across all namespaces
    async fn list_pods(&self) -> Result<Vec<core::Pod>>;

    /// List resource quotas across all namespaces
    async fn list_quotas(&self) -> Result<Vec<core::ResourceQuota>>;

    async fn list_nodes(&self) -> Result<Vec<core::Node>>;
}

/// A failed inventory list call
#[derive(Debug, Error)]
#[error("Unable to return list of {resource}: {cause:#}")]
pub struct FetchError {
    pub resource: &'static str,
    pub cause: anyhow::Error,
}

impl FetchError {
    fn new(resource: &'static str, cause: anyhow::Error) -> Self {
        Self { resource, cause }
    }
}

/// Outcome of auditing the cluster once
#[derive(Debug)]
pub struct Audit {
    pub snapshot: Snapshot,
    pub fetch_error: Option<FetchError>,
    pub aggregation_errors: Vec<AggregationError>,
}

/// Fetch all four inventory lists, stopping at the first failure
///
/// Calls are made in the order namespaces, pods, quotas, nodes.
pub async fn fetch_inventory(reader: &dyn ClusterReader) -> Result<Inventory, FetchError> {
    let namespaces = reader
        .list_namespaces()
        .await
        .map_err(|e| FetchError::new("namespaces", e))?;
    let pods = reader
        .list_pods()
        .await
        .map_err(|e| FetchError::new("pods", e))?;
    let quotas = reader
        .list_quotas()
        .await
        .map_err(|e| FetchError::new("resource quotas", e))?;
    let nodes = reader
        .list_nodes()
        .await
        .map_err(|e| FetchError::new("nodes", e))?;

    debug!(
        namespaces = namespaces.len(),
        pods = pods.len(),
        quotas = quotas.len(),
        nodes = nodes.len(),
        "Fetched cluster inventory"
    );

    Ok(Inventory {
        namespaces,
        pods,
        quotas,
        nodes,
    })
}

/// Build one snapshot of the cluster
///
/// A fetch failure yields an empty-bodied snapshot carrying the error
/// message. The snapshot is successful only when every fetch succeeded and
/// aggregation found no inconsistency. Timing fields are left to the caller.
pub async fn audit_cluster(reader: &dyn ClusterReader, cluster_id: &str) -> Audit {
    let mut audit = match fetch_inventory(reader).await {
        Ok(inventory) => {
            let Aggregation {
                mut snapshot,
                errors,
            } = aggregate(&inventory);

            snapshot.success = errors.is_empty();
            if !errors.is_empty() {
                snapshot.error_message =
                    format!("{} aggregation inconsistencies recorded", errors.len());
            }

            Audit {
                snapshot,
                fetch_error: None,
                aggregation_errors: errors,
            }
        }
        Err(e) => {
            warn!(error = %e, "Cluster inventory fetch failed");
            Audit {
                snapshot: Snapshot::failed(e.to_string()),
                fetch_error: Some(e),
                aggregation_errors: Vec::new(),
            }
        }
    };

    audit.snapshot.cluster_id = cluster_id.to_string();
    audit
}

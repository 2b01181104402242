//! Snapshot aggregation
//!
//! Builds the namespace → pod/quota hierarchy for one tick. All namespace
//! records are created before any child is attached; children are attached
//! through a name index built once per tick.

use super::extract::{namespace_record, node_record, pod_record, quota_record};
use crate::models::Snapshot;
use k8s_openapi::api::core::v1 as core;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

/// Raw inventory fetched for one tick
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub namespaces: Vec<core::Namespace>,
    pub pods: Vec<core::Pod>,
    pub quotas: Vec<core::ResourceQuota>,
    pub nodes: Vec<core::Node>,
}

/// A child record that could not be attached to its namespace
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("{kind} {name} references namespace {namespace} which is not in this snapshot")]
    UnknownNamespace {
        kind: &'static str,
        name: String,
        namespace: String,
    },
    #[error("namespace {0} is listed more than once, children attach to the first record")]
    DuplicateNamespace(String),
}

/// Result of aggregating one tick's inventory
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub snapshot: Snapshot,
    pub errors: Vec<AggregationError>,
}

/// Name → position of the namespace record in the snapshot
struct NamespaceIndex(HashMap<String, usize>);

impl NamespaceIndex {
    fn lookup(
        &self,
        kind: &'static str,
        name: &str,
        namespace: &str,
    ) -> Result<usize, AggregationError> {
        self.0
            .get(namespace)
            .copied()
            .ok_or_else(|| AggregationError::UnknownNamespace {
                kind,
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }
}

/// Assemble a snapshot body from raw inventory
///
/// Cluster id, timestamp, duration and the success flag are left for the
/// caller. Inconsistent items are skipped and returned as errors; they never
/// abort the aggregation.
pub fn aggregate(inventory: &Inventory) -> Aggregation {
    let mut snapshot = Snapshot::default();
    let mut errors = Vec::new();
    let mut index = NamespaceIndex(HashMap::with_capacity(inventory.namespaces.len()));

    for raw in &inventory.namespaces {
        let record = namespace_record(raw);
        if index.0.contains_key(&record.name) {
            errors.push(AggregationError::DuplicateNamespace(record.name.clone()));
        } else {
            index.0.insert(record.name.clone(), snapshot.namespaces.len());
        }
        snapshot.namespaces.push(record);
    }

    for raw in &inventory.pods {
        let pod = pod_record(raw);
        match index.lookup("pod", &pod.name, &pod.namespace) {
            Ok(i) => snapshot.namespaces[i].pods.push(pod),
            Err(e) => errors.push(e),
        }
    }

    for raw in &inventory.quotas {
        let quota = quota_record(raw);
        match index.lookup("resource quota", &quota.name, &quota.namespace) {
            Ok(i) => snapshot.namespaces[i].resource_quotas.push(quota),
            Err(e) => errors.push(e),
        }
    }

    snapshot.nodes = inventory.nodes.iter().map(node_record).collect();

    for e in &errors {
        warn!(error = %e, "Aggregation inconsistency");
    }
    snapshot.aggregation_errors = errors.iter().map(ToString::to_string).collect();

    Aggregation { snapshot, errors }
}

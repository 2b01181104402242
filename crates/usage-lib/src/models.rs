//! Core data models for the usage log
//!
//! These records are the persisted shape of a cluster snapshot. Field names
//! are serialized in camelCase and string maps are ordered so that two
//! snapshots of the same inventory produce identical bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One complete cluster-inventory record produced by a single scheduler tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub cluster_id: String,
    /// UTC timestamp in RFC 3339 with millisecond precision
    pub time: String,
    /// Seconds elapsed since the start of the previous tick
    pub duration: f64,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
    pub success: bool,
    pub error_message: String,
    /// Per-item inconsistencies found while attaching children to namespaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregation_errors: Vec<String>,
}

impl Snapshot {
    /// Create an empty-bodied snapshot carrying only a failure message
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: message.into(),
            ..Default::default()
        }
    }

    /// Number of pods across all namespaces
    pub fn pod_count(&self) -> usize {
        self.namespaces.iter().map(|ns| ns.pods.len()).sum()
    }

    /// Number of resource quotas across all namespaces
    pub fn quota_count(&self) -> usize {
        self.namespaces.iter().map(|ns| ns.resource_quotas.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub resource_quotas: Vec<ResourceQuota>,
    #[serde(default)]
    pub pods: Vec<Pod>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    pub name: String,
    pub namespace: String,
    pub node_name: String,
    pub uid: String,
    /// Pod phase, empty when the inventory has not reported one
    pub status: String,
    pub ip: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub owners: Vec<Owner>,
    #[serde(default)]
    pub containers: Vec<Container>,
}

/// Owner reference of a pod
///
/// `controller` and `block_owner_deletion` are tri-state: an absent flag is
/// serialized as `null` and is distinct from `false`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub controller: Option<bool>,
    pub block_owner_deletion: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    pub resources: ResourceValues,
    /// Uid of the pod this container belongs to
    pub owner_uid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuota {
    pub name: String,
    pub namespace: String,
    pub spec_hard_resources: ResourceValues,
    pub status_hard_resources: ResourceValues,
    pub status_used_resources: ResourceValues,
}

/// CPU/memory limit-and-request quadruple in the inventory's native units
///
/// CPU is in whole cores rounded up, memory in bytes. Missing entries are zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceValues {
    pub name: String,
    pub cpu_limits: u64,
    pub memory_limits: u64,
    pub cpu_requests: u64,
    pub memory_requests: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: String,
    pub external_id: String,
    pub internal_ip: String,
    pub external_ip: String,
    pub allocatable: ResourceValues,
    pub capacity: ResourceValues,
    /// Status of the `Ready` condition, empty when the node reports none
    pub status: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

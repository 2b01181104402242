//! Resource extraction
//!
//! Converts single raw inventory objects into the normalized records of
//! [`crate::models`]. Nothing here can fail: absent fields become empty
//! strings, empty maps or zero-valued resource groups.

use super::quantity::quantity_value;
use crate::models::{Container, Namespace, Node, Owner, Pod, ResourceQuota, ResourceValues};
use k8s_openapi::api::core::v1 as core;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::collections::BTreeMap;

/// Raw resource list keyed by resource name
pub type ResourceList = BTreeMap<String, Quantity>;

/// Resource group names used in persisted snapshots
pub mod groups {
    pub const SPEC_HARD: &str = "spec.hard";
    pub const STATUS_HARD: &str = "status.hard";
    pub const STATUS_USED: &str = "status.used";
    pub const ALLOCATABLE: &str = "allocatable";
    pub const CAPACITY: &str = "capacity";
    pub const CONTAINER: &str = "resources";
}

const INTERNAL_IP: &str = "InternalIP";
const EXTERNAL_IP: &str = "ExternalIP";
const READY_CONDITION: &str = "Ready";

/// Value of `name` in a resource list, zero if the key or the list is absent
pub fn extract_quantity(list: Option<&ResourceList>, name: &str) -> u64 {
    list.and_then(|l| l.get(name)).map(quantity_value).unwrap_or(0)
}

/// Quota resource group (`limits.cpu`, `limits.memory`, `requests.cpu`, `requests.memory`)
pub fn quota_values(group: &str, list: Option<&ResourceList>) -> ResourceValues {
    ResourceValues {
        name: group.to_string(),
        cpu_limits: extract_quantity(list, "limits.cpu"),
        memory_limits: extract_quantity(list, "limits.memory"),
        cpu_requests: extract_quantity(list, "requests.cpu"),
        memory_requests: extract_quantity(list, "requests.memory"),
    }
}

/// Node resource group; only limits are populated
pub fn node_values(group: &str, list: Option<&ResourceList>) -> ResourceValues {
    ResourceValues {
        name: group.to_string(),
        cpu_limits: extract_quantity(list, "cpu"),
        memory_limits: extract_quantity(list, "memory"),
        ..Default::default()
    }
}

/// Container limits and requests
pub fn container_values(requirements: Option<&core::ResourceRequirements>) -> ResourceValues {
    let limits = requirements.and_then(|r| r.limits.as_ref());
    let requests = requirements.and_then(|r| r.requests.as_ref());

    ResourceValues {
        name: groups::CONTAINER.to_string(),
        cpu_limits: extract_quantity(limits, "cpu"),
        memory_limits: extract_quantity(limits, "memory"),
        cpu_requests: extract_quantity(requests, "cpu"),
        memory_requests: extract_quantity(requests, "memory"),
    }
}

pub fn namespace_record(raw: &core::Namespace) -> Namespace {
    let meta = &raw.metadata;
    Namespace {
        name: meta.name.clone().unwrap_or_default(),
        annotations: meta.annotations.clone().unwrap_or_default(),
        labels: meta.labels.clone().unwrap_or_default(),
        ..Default::default()
    }
}

pub fn owner_record(raw: &OwnerReference) -> Owner {
    Owner {
        api_version: raw.api_version.clone(),
        kind: raw.kind.clone(),
        name: raw.name.clone(),
        controller: raw.controller,
        block_owner_deletion: raw.block_owner_deletion,
    }
}

pub fn container_record(raw: &core::Container, pod_uid: &str) -> Container {
    Container {
        name: raw.name.clone(),
        image: raw.image.clone().unwrap_or_default(),
        resources: container_values(raw.resources.as_ref()),
        owner_uid: pod_uid.to_string(),
    }
}

pub fn pod_record(raw: &core::Pod) -> Pod {
    let meta = &raw.metadata;
    let uid = meta.uid.clone().unwrap_or_default();
    let spec = raw.spec.as_ref();
    let status = raw.status.as_ref();

    let owners = meta
        .owner_references
        .iter()
        .flatten()
        .map(owner_record)
        .collect();

    let containers = spec
        .map(|s| s.containers.iter().map(|c| container_record(c, &uid)).collect())
        .unwrap_or_default();

    Pod {
        name: meta.name.clone().unwrap_or_default(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        node_name: spec.and_then(|s| s.node_name.clone()).unwrap_or_default(),
        status: status.and_then(|s| s.phase.clone()).unwrap_or_default(),
        ip: status.and_then(|s| s.pod_ip.clone()).unwrap_or_default(),
        annotations: meta.annotations.clone().unwrap_or_default(),
        labels: meta.labels.clone().unwrap_or_default(),
        uid,
        owners,
        containers,
    }
}

pub fn quota_record(raw: &core::ResourceQuota) -> ResourceQuota {
    let meta = &raw.metadata;
    let spec_hard = raw.spec.as_ref().and_then(|s| s.hard.as_ref());
    let status_hard = raw.status.as_ref().and_then(|s| s.hard.as_ref());
    let status_used = raw.status.as_ref().and_then(|s| s.used.as_ref());

    ResourceQuota {
        name: meta.name.clone().unwrap_or_default(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        spec_hard_resources: quota_values(groups::SPEC_HARD, spec_hard),
        status_hard_resources: quota_values(groups::STATUS_HARD, status_hard),
        status_used_resources: quota_values(groups::STATUS_USED, status_used),
    }
}

pub fn node_record(raw: &core::Node) -> Node {
    let status = raw.status.as_ref();
    let addresses = status.and_then(|s| s.addresses.as_deref()).unwrap_or_default();
    let conditions = status.and_then(|s| s.conditions.as_deref()).unwrap_or_default();

    let first_address = |kind: &str| {
        addresses
            .iter()
            .find(|a| a.type_ == kind)
            .map(|a| a.address.clone())
            .unwrap_or_default()
    };

    Node {
        name: raw.metadata.name.clone().unwrap_or_default(),
        external_id: raw
            .spec
            .as_ref()
            .and_then(|s| s.external_id.clone())
            .unwrap_or_default(),
        internal_ip: first_address(INTERNAL_IP),
        external_ip: first_address(EXTERNAL_IP),
        allocatable: node_values(
            groups::ALLOCATABLE,
            status.and_then(|s| s.allocatable.as_ref()),
        ),
        capacity: node_values(groups::CAPACITY, status.and_then(|s| s.capacity.as_ref())),
        status: conditions
            .iter()
            .find(|c| c.type_ == READY_CONDITION)
            .map(|c| c.status.clone())
            .unwrap_or_default(),
        labels: raw.metadata.labels.clone().unwrap_or_default(),
    }
}

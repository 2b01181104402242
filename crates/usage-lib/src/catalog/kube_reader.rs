//! Kubernetes API backed cluster reader

use super::ClusterReader;
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as core;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::path::Path;
use tracing::info;

/// Reads the cluster inventory through the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterReader {
    client: Client,
}

impl KubeClusterReader {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the pod's service account
    pub fn in_cluster() -> Result<Self> {
        let config = Config::incluster().context("Failed to load in-cluster configuration")?;
        info!(cluster_url = %config.cluster_url, "Using in-cluster credentials");
        Self::from_config(config)
    }

    /// Connect using the current context of a kubeconfig file
    pub async fn from_kubeconfig(path: &Path) -> Result<Self> {
        let kubeconfig = Kubeconfig::read_from(path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context("Failed to build configuration from kubeconfig")?;
        info!(
            kubeconfig = %path.display(),
            cluster_url = %config.cluster_url,
            "Using kubeconfig credentials"
        );
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self> {
        let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
        Ok(Self::new(client))
    }

    async fn list_all<K>(&self) -> Result<Vec<K>>
    where
        K: kube::Resource + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items)
    }
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    async fn list_namespaces(&self) -> Result<Vec<core::Namespace>> {
        self.list_all().await
    }

    async fn list_pods(&self) -> Result<Vec<core::Pod>> {
        self.list_all().await
    }

    async fn list_quotas(&self) -> Result<Vec<core::ResourceQuota>> {
        self.list_all().await
    }

    async fn list_nodes(&self) -> Result<Vec<core::Node>> {
        self.list_all().await
    }
}

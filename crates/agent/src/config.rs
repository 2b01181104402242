//! Usage log configuration
//!
//! Values are layered, lowest precedence first: built-in defaults, an
//! optional config file, `USAGE_LOG_*` environment variables, then
//! command-line flags. The result is validated once and never mutated.

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Kubernetes usage logger
#[derive(Debug, Parser)]
#[command(name = "usage-log")]
#[command(version, about = "Kubernetes usage logger")]
#[command(
    long_about = "Logs Kubernetes usage to partitioned JSON files for accounting and billing processes."
)]
pub struct Cli {
    /// Unique ID to represent the cluster
    #[arg(long = "id")]
    pub cluster_id: Option<String>,

    /// Number of seconds per collection interval
    #[arg(long, alias = "usagePeriod")]
    pub usage_period: Option<u64>,

    /// Destination path for usage logs
    #[arg(long, short = 'd', alias = "destinationPath")]
    pub destination_path: Option<PathBuf>,

    /// Running internal to the cluster (false reads the kubeconfig)
    #[arg(long)]
    pub internal: Option<bool>,

    /// Path to the kubeconfig file (defaults to ~/.kube/config)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Port for the health and metrics server
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Optional configuration file (TOML, YAML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Usage log configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Identifier written into every snapshot
    #[serde(default)]
    pub cluster_id: String,

    /// Seconds between snapshots
    pub usage_period: u64,

    /// Base path for the partitioned snapshot files
    pub destination_path: PathBuf,

    /// Use in-cluster service account credentials
    pub internal: bool,

    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    pub api_port: u16,
}

impl AgentConfig {
    /// Load configuration from defaults, file, environment and flags
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("usage_period", 60u64)?
            .set_default("destination_path", "logs/")?
            .set_default("internal", true)?
            .set_default("api_port", 8080u64)?;

        if let Some(path) = &cli.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("USAGE_LOG").try_parsing(true))
            .set_override_option("cluster_id", cli.cluster_id.clone())?
            .set_override_option("usage_period", cli.usage_period)?
            .set_override_option("destination_path", path_value(cli.destination_path.as_deref()))?
            .set_override_option("internal", cli.internal)?
            .set_override_option("kubeconfig", path_value(cli.kubeconfig.as_deref()))?
            .set_override_option("api_port", cli.api_port.map(u64::from))?
            .build()
            .context("Failed to load configuration")?;

        let config: AgentConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cluster_id.trim().is_empty() {
            bail!("A cluster id must be provided (--id or USAGE_LOG_CLUSTER_ID)");
        }
        if self.usage_period == 0 {
            bail!("The usage period must be at least one second");
        }
        Ok(())
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.usage_period)
    }

    /// Kubeconfig to use when running outside the cluster
    pub fn kubeconfig_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.kubeconfig {
            return Ok(path.clone());
        }

        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".kube").join("config"))
    }
}

fn path_value(path: Option<&Path>) -> Option<String> {
    path.map(|p| p.to_string_lossy().into_owned())
}

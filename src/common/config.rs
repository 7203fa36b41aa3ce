//! Configuration for replistore components

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Coordinator-specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<CoordinatorConfig>,

    /// Storage-node-specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<StoreNodeConfig>,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coordinator: None,
            node: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from an optional `replistore.toml` plus `REPLISTORE_*` environment
    /// overrides; falls back to defaults when neither is present.
    pub fn load() -> Self {
        config::Config::builder()
            .add_source(config::File::with_name("replistore").required(false))
            .add_source(config::Environment::with_prefix("REPLISTORE").separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap_or_default()
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Bind address for the control listener
    pub bind_addr: SocketAddr,

    /// Replication factor R
    #[serde(default = "default_replication")]
    pub replication: usize,

    /// Deadline for in-flight store/remove operations (ms)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Liveness probe period (ms)
    #[serde(default = "default_probe_period_ms")]
    pub probe_period_ms: u64,

    /// Inventory sweep period (ms); drives the periodic LIST probe only
    #[serde(default = "default_rebalance_period_ms")]
    pub rebalance_period_ms: u64,
}

fn default_replication() -> usize {
    3
}
fn default_timeout_ms() -> u64 {
    2_000
}
fn default_probe_period_ms() -> u64 {
    5_000
}
fn default_rebalance_period_ms() -> u64 {
    30_000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4000".parse().expect("static address"),
            replication: default_replication(),
            timeout_ms: default_timeout_ms(),
            probe_period_ms: default_probe_period_ms(),
            rebalance_period_ms: default_rebalance_period_ms(),
        }
    }
}

impl CoordinatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn probe_period(&self) -> Duration {
        Duration::from_millis(self.probe_period_ms)
    }

    pub fn rebalance_period(&self) -> Duration {
        Duration::from_millis(self.rebalance_period_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.replication == 0 {
            return Err(Error::InvalidConfig("replication must be at least 1".into()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfig("timeout_ms must be non-zero".into()));
        }
        if self.probe_period_ms == 0 || self.rebalance_period_ms == 0 {
            return Err(Error::InvalidConfig("periods must be non-zero".into()));
        }
        Ok(())
    }
}

/// Storage node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreNodeConfig {
    /// Bind address for the data listener; port 0 picks an ephemeral port,
    /// and the chosen port is what gets advertised in JOIN
    pub listen_addr: SocketAddr,

    /// Coordinator control address
    pub coordinator_addr: SocketAddr,

    /// Directory holding blob files; cleared on startup
    pub data_dir: PathBuf,

    /// Largest accepted blob (bytes)
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
}

fn default_max_blob_size() -> u64 {
    64 * 1024 * 1024
}

impl Default for StoreNodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7000".parse().expect("static address"),
            coordinator_addr: "127.0.0.1:4000".parse().expect("static address"),
            data_dir: PathBuf::from("./node-data"),
            max_blob_size: default_max_blob_size(),
        }
    }
}

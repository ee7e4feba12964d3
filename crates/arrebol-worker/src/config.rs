//! Configuration for the worker agent.
//!
//! Two sources: the worker identity file (JSON, path from `CONF_FILE_PATH`)
//! declaring the resources this instance advertises, and process environment
//! variables for everything tied to the deployment (dispatcher endpoint,
//! container runtime address, helper-script location, keystore directory).

use crate::error::{Result, WorkerError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Path to the worker identity file.
pub const CONF_FILE_PATH_ENV: &str = "CONF_FILE_PATH";
/// Base URL of the dispatcher.
pub const SERVER_ENDPOINT_ENV: &str = "SERVER_ENDPOINT";
/// Container runtime endpoint; unset means the local Docker socket.
pub const WORKER_NODE_ADDRESS_ENV: &str = "WORKER_NODE_ADDRESS";
/// Directory holding `task-script-executor.sh`.
pub const BIN_PATH_ENV: &str = "BIN_PATH";
/// Keystore directory.
pub const KEYS_PATH_ENV: &str = "KEYS_PATH";

/// Worker identity as declared in the configuration file.
///
/// The field names are the dispatcher's contract; unknown fields in the
/// file are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(rename = "ID")]
    pub id: Uuid,
    /// vCPU share advertised to the dispatcher; fractional values are valid.
    #[serde(rename = "Vcpu")]
    pub vcpu: f32,
    /// RAM in MB advertised to the dispatcher.
    #[serde(rename = "Ram")]
    pub ram_mb: u32,
    /// Pre-assigned queue; 0 means the join response decides.
    #[serde(rename = "QueueID", default)]
    pub queue_id: u64,
}

impl WorkerConfig {
    /// Load and parse the identity file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            WorkerError::Configuration(format!("cannot read worker config {}: {e}", path.display()))
        })?;
        let config: WorkerConfig = serde_json::from_str(&content)
            .map_err(|e| WorkerError::Configuration(format!("invalid worker config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.vcpu <= 0.0 {
            return Err(WorkerError::Configuration("Vcpu must be positive".to_string()));
        }
        if self.ram_mb == 0 {
            return Err(WorkerError::Configuration("Ram must be positive".to_string()));
        }
        Ok(())
    }
}

/// Deployment settings taken from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server_endpoint: String,
    pub conf_file_path: PathBuf,
    pub node_address: Option<String>,
    pub bin_path: PathBuf,
    pub keys_path: PathBuf,
}

impl Settings {
    /// Read all settings from the environment. Call after `dotenvy` has had
    /// its chance to populate it.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server_endpoint: required_env(SERVER_ENDPOINT_ENV)?,
            conf_file_path: conf_file_path()?,
            node_address: env::var(WORKER_NODE_ADDRESS_ENV).ok().filter(|v| !v.is_empty()),
            bin_path: PathBuf::from(required_env(BIN_PATH_ENV)?),
            keys_path: keys_path(),
        })
    }
}

/// Worker identity file location from the environment.
pub fn conf_file_path() -> Result<PathBuf> {
    required_env(CONF_FILE_PATH_ENV).map(PathBuf::from)
}

/// Keystore location from the environment, with a local default.
pub fn keys_path() -> PathBuf {
    env::var(KEYS_PATH_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(crate::defaults::KEYS_PATH))
}

fn required_env(var: &str) -> Result<String> {
    env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| WorkerError::Configuration(format!("{var} must be set")))
}

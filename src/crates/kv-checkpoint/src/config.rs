//! Store configuration
//!
//! [`StoreConfig`] can be built in code, read from environment variables
//! with a prefix, or loaded from a YAML/JSON file:
//!
//! ```rust,ignore
//! use kv_checkpoint::StoreConfig;
//!
//! // CHECKPOINT_TTL_SECONDS=86400 CHECKPOINT_SCAN_COUNT=200
//! let config = StoreConfig::from_env("CHECKPOINT")?;
//!
//! // ttl_seconds: 86400
//! // refresh_on_read: true
//! let config = StoreConfig::from_file("checkpoint.yaml")?;
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CheckpointError, Result};
use crate::scan::DEFAULT_SCAN_COUNT;

/// Default number of keys deleted per backend call in `delete_thread`
pub const DEFAULT_DELETE_BATCH_SIZE: usize = 500;

fn default_scan_count() -> usize {
    DEFAULT_SCAN_COUNT
}

fn default_delete_batch_size() -> usize {
    DEFAULT_DELETE_BATCH_SIZE
}

/// Configuration for [`KvCheckpointSaver`](crate::saver::KvCheckpointSaver)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Expiry applied to every checkpoint record and pending write
    #[serde(default)]
    pub ttl_seconds: Option<u64>,

    /// Re-apply the TTL when a checkpoint is read
    #[serde(default)]
    pub refresh_on_read: bool,

    /// COUNT hint per scan page
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,

    /// Keys per delete call in `delete_thread`
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: None,
            refresh_on_read: false,
            scan_count: DEFAULT_SCAN_COUNT,
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire checkpoints and their writes after `seconds`
    pub fn with_ttl_seconds(mut self, seconds: u64) -> Self {
        self.ttl_seconds = Some(seconds);
        self
    }

    pub fn with_refresh_on_read(mut self, refresh: bool) -> Self {
        self.refresh_on_read = refresh;
        self
    }

    pub fn with_scan_count(mut self, count: usize) -> Self {
        self.scan_count = count;
        self
    }

    pub fn with_delete_batch_size(mut self, size: usize) -> Self {
        self.delete_batch_size = size;
        self
    }

    /// Reject settings the store cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ttl_seconds == Some(0) {
            return Err(CheckpointError::Config(
                "ttl_seconds must be positive when set".to_string(),
            ));
        }
        if self.scan_count == 0 {
            return Err(CheckpointError::Config(
                "scan_count must be positive".to_string(),
            ));
        }
        if self.delete_batch_size == 0 {
            return Err(CheckpointError::Config(
                "delete_batch_size must be positive".to_string(),
            ));
        }
        if self.refresh_on_read && self.ttl_seconds.is_none() {
            tracing::warn!("refresh_on_read has no effect without ttl_seconds");
        }
        Ok(())
    }

    /// Load from `{prefix}_TTL_SECONDS`, `{prefix}_REFRESH_ON_READ`,
    /// `{prefix}_SCAN_COUNT` and `{prefix}_DELETE_BATCH_SIZE`; unset
    /// variables keep their defaults.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let var = |name: &str| format!("{}_{}", prefix, name);
        let defaults = Self::default();

        let config = Self {
            ttl_seconds: get_env_parse_opt(&var("TTL_SECONDS"))?,
            refresh_on_read: get_env_bool_opt(&var("REFRESH_ON_READ"))?
                .unwrap_or(defaults.refresh_on_read),
            scan_count: get_env_parse_opt(&var("SCAN_COUNT"))?.unwrap_or(defaults.scan_count),
            delete_batch_size: get_env_parse_opt(&var("DELETE_BATCH_SIZE"))?
                .unwrap_or(defaults.delete_batch_size),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML or JSON file, picked by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_config_file(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Parse an environment variable if it is set.
fn get_env_parse_opt<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|e| {
            CheckpointError::Config(format!(
                "Failed to parse environment variable '{}': {}",
                key, e
            ))
        }),
        Err(_) => Ok(None),
    }
}

/// Read a boolean environment variable if it is set.
fn get_env_bool_opt(key: &str) -> Result<Option<bool>> {
    let Ok(value) = std::env::var(key) else {
        return Ok(None);
    };
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(CheckpointError::Config(format!(
            "Invalid boolean value for '{}': {}",
            key, value
        ))),
    }
}

fn load_config_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| {
            CheckpointError::Config(format!("Unable to determine file extension for {:?}", path))
        })?;
    let content = std::fs::read_to_string(path)?;

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| {
            CheckpointError::Config(format!("Failed to parse YAML config from {:?}: {}", path, e))
        }),
        "json" => serde_json::from_str(&content).map_err(|e| {
            CheckpointError::Config(format!("Failed to parse JSON config from {:?}: {}", path, e))
        }),
        _ => Err(CheckpointError::Config(format!(
            "Unsupported config file extension: {}",
            extension
        ))),
    }
}

//! Recovery Configuration
//!
//! Defaults for the encode pipeline. Values can be overridden from an
//! optional YAML file and then from CLI flags.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::strategy::DEFAULT_GROUP_SIZE;

/// Default number of tolerated losses when a request does not specify one.
pub const DEFAULT_RECOVERABILITY: u32 = 3;

/// Default strategy name.
pub const DEFAULT_STRATEGY: &str = "reed-solomon";

/// Configuration for the encode orchestrator and the built-in strategies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Recoverability used when the caller does not pass one
    pub default_recoverability: u32,

    /// Strategy name used when the caller does not pass one
    pub default_strategy: String,

    /// Timeout for path resolution in seconds
    pub resolve_timeout_secs: u64,

    /// Maximum sibling blocks per Reed-Solomon group
    pub group_size: usize,

    /// Check that the encoded root is retrievable before pinning it
    pub verify_encoded_root: bool,

    /// Chunk size used by the importer
    pub chunk_size: usize,

    /// Maximum links per interior node built by the importer
    pub max_links: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            default_recoverability: DEFAULT_RECOVERABILITY,
            default_strategy: DEFAULT_STRATEGY.to_string(),
            resolve_timeout_secs: 60,
            group_size: DEFAULT_GROUP_SIZE,
            verify_encoded_root: true,
            chunk_size: 256 * 1024,
            max_links: 174,
        }
    }
}

impl RecoveryConfig {
    /// Load a configuration file. Missing keys keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Parse a YAML document and validate it.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: RecoveryConfig = serde_yaml::from_str(raw)
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.default_recoverability == 0 {
            return Err(Error::Config(
                "default_recoverability must be at least 1".to_string(),
            ));
        }
        if self.resolve_timeout_secs == 0 {
            return Err(Error::Config(
                "resolve_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.group_size == 0 {
            return Err(Error::Config("group_size must be at least 1".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".to_string()));
        }
        if self.max_links < 2 {
            return Err(Error::Config("max_links must be at least 2".to_string()));
        }
        Ok(())
    }
}

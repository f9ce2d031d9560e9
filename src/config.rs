//! Store configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compression::{DEFAULT_BLOCK_SIZE, DEFAULT_COMPRESSION_LEVEL};
use crate::core::{Error, Result};
use crate::volume::SelectionStrategy;

/// Configuration for a [`Store`](crate::store::Store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Uncompressed bytes per compressed block.
    /// Default: 1 MB
    pub block_size: usize,

    /// Zstd compression level (1-22).
    /// Default: 3
    pub compression_level: i32,

    /// Volume placement strategy for new containers.
    /// Default: round robin
    pub volume_strategy: SelectionStrategy,

    /// Seed for randomized placement strategies; entropy when unset.
    pub seed: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            volume_strategy: SelectionStrategy::default(),
            seed: None,
        }
    }
}

impl StoreConfig {
    /// Reads a JSON config file; absent fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(Error::at(path))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

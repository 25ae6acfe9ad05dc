use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::resolver::MAX_RESOLVE_DEPTH;

/// Tuning knobs for a [`Store`](crate::Store).
///
/// Every field has a default, so a TOML document only needs the keys it
/// overrides:
///
/// ```toml
/// max_chain_depth = 8
/// cache_capacity = 256
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Longest delta chain the write planner will build. A hint already at
    /// this depth makes the new entry a snapshot.
    pub max_chain_depth: u32,
    /// Upper bound on the bytes materialised while reconstructing a chain,
    /// counting every hop including the new entry.
    pub max_chain_bytes: u64,
    /// zstd level for snapshots and deltas.
    pub compression_level: i32,
    /// Entries held in the cross-call content cache. `0` disables it.
    pub cache_capacity: usize,
    /// Contents larger than this are never cached.
    pub cache_max_entry_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: 24,
            max_chain_bytes: 64 * 1024 * 1024, // 64 MiB
            compression_level: zstore_delta::DEFAULT_COMPRESSION_LEVEL,
            cache_capacity: 0,
            cache_max_entry_bytes: 1024 * 1024, // 1 MiB
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from TOML, filling unspecified fields with defaults.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every field is in range.
    pub fn validate(&self) -> StoreResult<()> {
        if self.max_chain_depth == 0 || self.max_chain_depth > MAX_RESOLVE_DEPTH {
            return Err(StoreError::Config(format!(
                "max_chain_depth must be in 1..={MAX_RESOLVE_DEPTH}, got {}",
                self.max_chain_depth
            )));
        }
        if self.max_chain_bytes == 0 {
            return Err(StoreError::Config("max_chain_bytes must be positive".into()));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(StoreError::Config(format!(
                "compression_level must be in 1..=22, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }
}

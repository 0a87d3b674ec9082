//! Store configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::map::{DEFAULT_CAPACITY, MIN_CAPACITY};

/// Configuration for a metric store.
///
/// Hosts usually carry this inside their own configuration document; see
/// [`StoreConfig::from_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Name given to the registry.
    pub registry_name: String,

    /// Arena byte budget, used by [`HeapArena::from_config`](crate::HeapArena::from_config).
    pub segment_size: usize,

    /// Starting bucket count of every map the registry creates.
    pub initial_map_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            registry_name: "default".to_string(),
            segment_size: 1024 * 1024, // 1 MiB
            initial_map_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl StoreConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the registry name.
    pub fn with_registry_name(mut self, name: impl Into<String>) -> Self {
        self.registry_name = name.into();
        self
    }

    /// Set the arena byte budget.
    pub fn with_segment_size(mut self, bytes: usize) -> Self {
        self.segment_size = bytes;
        self
    }

    /// Set the initial map capacity, raised to the minimum if smaller.
    pub fn with_initial_map_capacity(mut self, capacity: usize) -> Self {
        self.initial_map_capacity = capacity.max(MIN_CAPACITY);
        self
    }

    /// Reject values no store can work with.
    pub fn validate(&self) -> Result<()> {
        if self.segment_size == 0 {
            return Err(Error::Config("segment_size must be greater than zero".into()));
        }
        if self.initial_map_capacity < MIN_CAPACITY {
            return Err(Error::Config(format!(
                "initial_map_capacity must be at least {MIN_CAPACITY}, got {}",
                self.initial_map_capacity
            )));
        }
        Ok(())
    }
}

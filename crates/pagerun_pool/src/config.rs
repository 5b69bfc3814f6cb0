//! # Slot Pool Configuration
//!
//! ```toml
//! # data/pools/command_buffers.toml
//! slots_per_batch = 16
//! initial_batches = 1
//! ```

use pagerun_core::{ConfigError, ConfigFile};
use serde::{Deserialize, Serialize};

/// Growth policy of a [`SlotPool`](crate::SlotPool).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotPoolConfig {
    /// Resources created together whenever the pool runs dry.
    pub slots_per_batch: usize,
    /// Batches created up front by [`SlotPool::new`](crate::SlotPool::new).
    pub initial_batches: usize,
}

impl Default for SlotPoolConfig {
    fn default() -> Self {
        Self {
            slots_per_batch: 16,
            initial_batches: 0,
        }
    }
}

impl SlotPoolConfig {
    /// Command buffers: recorded every frame, so one batch is made eagerly.
    #[must_use]
    pub const fn command_buffers() -> Self {
        Self {
            slots_per_batch: 16,
            initial_batches: 1,
        }
    }

    /// Fences: a handful in flight per queue.
    #[must_use]
    pub const fn fences() -> Self {
        Self {
            slots_per_batch: 8,
            initial_batches: 1,
        }
    }
}

impl ConfigFile for SlotPoolConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.slots_per_batch == 0 {
            return Err(ConfigError::Invalid(
                "slots_per_batch must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

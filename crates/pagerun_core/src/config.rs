//! # Allocator Configuration
//!
//! Bucket geometry is tuned per consumer and loaded once at startup from
//! TOML files:
//!
//! ```toml
//! # data/allocators/descriptor_sets.toml
//! pages_per_bucket = 32
//! page_size = 1
//! ```
//!
//! Missing keys fall back to the defaults.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A configuration type that can be loaded from TOML and validated.
pub trait ConfigFile: DeserializeOwned {
    /// Rejects values that parse but describe an impossible allocator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for values rejected by [`Self::validate`].
    fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
    fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Geometry of a [`DynAllocator`](crate::DynAllocator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Pages in every bucket. Also the largest single allocation.
    pub pages_per_bucket: usize,
    /// Address units per page. Must match the preallocator.
    pub page_size: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            pages_per_bucket: 64,
            page_size: 1,
        }
    }
}

impl AllocatorConfig {
    /// Descriptor pools: one page per descriptor set, small pools so an
    /// idle scene does not pin much device memory.
    #[must_use]
    pub const fn descriptor_sets() -> Self {
        Self {
            pages_per_bucket: 32,
            page_size: 1,
        }
    }

    /// Device memory in 64 KiB pages, 256 MiB per bucket.
    #[must_use]
    pub const fn device_memory() -> Self {
        Self {
            pages_per_bucket: 4096,
            page_size: 64 * 1024,
        }
    }
}

impl ConfigFile for AllocatorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.pages_per_bucket == 0 {
            return Err(ConfigError::Invalid(
                "pages_per_bucket must be greater than zero".into(),
            ));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid(
                "page_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

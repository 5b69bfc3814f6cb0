//! # Slot Pool Error Types

use std::error::Error as StdError;

use pagerun_core::{AllocError, ConfigError};
use thiserror::Error;

/// Errors raised while building a [`SlotPool`](crate::SlotPool).
#[derive(Error, Debug)]
pub enum PoolError<E: StdError + 'static> {
    /// The pool configuration was rejected before anything was created.
    #[error("invalid slot pool configuration: {0}")]
    Config(#[from] ConfigError),

    /// An initial batch could not be created.
    #[error("slot pool could not create its initial batches: {0}")]
    Alloc(#[from] AllocError<E>),
}

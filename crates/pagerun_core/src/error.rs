//! # Allocator Error Types
//!
//! Failures that reach the caller as values. Misuse of the API (freeing a
//! foreign address, double frees) is not represented here: it is asserted in
//! debug builds and otherwise leaves the allocator untouched.

use std::convert::Infallible;

use thiserror::Error;

/// Errors returned by the must-succeed allocation entry points.
///
/// `E` is the error type of the backing resource a growable allocator pulls
/// new buckets from. Fixed-size allocators never fail that way and use the
/// default, [`Infallible`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError<E = Infallible> {
    /// No run of the requested size (and alignment) is available.
    #[error("allocator out of pages: no free run of {requested} page(s)")]
    OutOfPages {
        /// Pages asked for.
        requested: usize,
    },

    /// The backing resource could not provide space for a new bucket.
    #[error("backing resource could not provide a new bucket")]
    Backing(#[source] E),
}

/// Result type for allocation operations.
pub type AllocResult<T, E = Infallible> = Result<T, AllocError<E>>;

/// Errors raised while loading allocator configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for the expected schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration parsed but describes an impossible allocator.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

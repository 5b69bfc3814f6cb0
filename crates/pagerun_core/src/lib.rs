//! # Pagerun Core
//!
//! Page-granular range allocators for engine resource pools.
//!
//! The allocators hand out contiguous runs of pages inside an address space
//! they never touch. Addresses are opaque: byte offsets into a device heap,
//! slot indices into a vector of fences, or anything implementing
//! [`Address`].
//!
//! ## Design Principles
//!
//! 1. **No hidden state** - every allocator owns its bitmap; no globals
//! 2. **Cheap when full** - a search that scanned everything is remembered
//!    until the next free
//! 3. **Backing-agnostic growth** - [`DynAllocator`] asks a [`Preallocator`]
//!    for new buckets and knows nothing else about the resource
//!
//! ## Example
//!
//! ```rust,ignore
//! use pagerun_core::{DynAllocator, StaticAllocator};
//!
//! // Fixed pool of 256 command buffer slots.
//! let mut slots = StaticAllocator::new(0usize, 256);
//! let cmd = slots.alloc(1, 0)?;
//! slots.dealloc(cmd);
//!
//! // Growable descriptor set allocator, 32 sets per pool.
//! let mut sets = DynAllocator::new(DescriptorPools::new(device), 32);
//! let set = sets.alloc(1)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod address;
pub mod allocator;
pub mod config;
pub mod error;

pub use address::Address;
pub use allocator::{
    Allocation, AllocatorStats, DynAllocator, DynAllocatorStats, PageBitmap, PageStatus,
    Preallocator, StaticAllocator,
};
pub use config::{AllocatorConfig, ConfigFile};
pub use error::{AllocError, AllocResult, ConfigError};

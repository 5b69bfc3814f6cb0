//! # Page Allocators
//!
//! Range allocation over opaque, page-granular address spaces.
//!
//! ## Layers
//!
//! - [`PageBitmap`]: packed per-page occupancy plus the run primitives
//!   (search, fill, erase, resize).
//! - [`StaticAllocator`]: one fixed window, adaptive strided search,
//!   alignment-aware allocation, in-place resize.
//! - [`DynAllocator`]: unbounded capacity from fixed-size buckets acquired
//!   through a [`Preallocator`].
//!
//! Nothing here is thread-safe and nothing is global: every allocator owns
//! all of its state.

mod bitmap;
mod dyn_alloc;
mod static_alloc;
mod stats;

pub use bitmap::{PageBitmap, PageStatus};
pub use dyn_alloc::{DynAllocator, DynAllocatorStats, Preallocator};
pub use static_alloc::{Allocation, StaticAllocator};
pub use stats::AllocatorStats;

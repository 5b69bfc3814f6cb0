//! # Pagerun Pool
//!
//! Index-addressed pools of reusable resources built on
//! [`pagerun_core::DynAllocator`].
//!
//! A pool owns a flat `Vec` of resources (fences, command buffers,
//! descriptor slots). Slots are pages of size one whose address is the
//! index into that vector. When every slot is in use the pool creates a
//! whole batch of new resources at once through its factory.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pagerun_pool::{SlotPool, SlotPoolConfig};
//!
//! let mut fences = SlotPool::new(&SlotPoolConfig::fences(), |_| create_fence(device))?;
//!
//! let slot = fences.acquire()?;
//! submit(fences.get(slot).unwrap());
//! fences.release(slot);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod slot_pool;

pub use config::SlotPoolConfig;
pub use error::PoolError;
pub use slot_pool::{Slot, SlotPool};

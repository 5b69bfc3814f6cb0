//! # Dynamic Allocator
//!
//! Effectively unbounded capacity built from equally sized
//! [`StaticAllocator`] buckets. Buckets are created on demand through a
//! [`Preallocator`], the capability that owns the real backing resource
//! (device memory, a descriptor pool, a vector of fences...).
//!
//! ## Limitations
//!
//! - An allocation never spans two buckets, so requests larger than
//!   `pages_per_bucket` always fail.
//! - Alignment is not forwarded to the buckets.

use tracing::{debug, warn};

use super::static_alloc::{Allocation, StaticAllocator};
use super::stats::AllocatorStats;
use crate::address::Address;
use crate::config::{AllocatorConfig, ConfigFile};
use crate::error::{AllocError, ConfigError};

/// Supplier of backing address ranges for [`DynAllocator`] buckets.
pub trait Preallocator {
    /// Address type handed out.
    type Addr: Address;

    /// Why the backing resource could not provide more space.
    type Error: std::error::Error + 'static;

    /// Address units per page.
    const PAGE_SIZE: usize = 1;

    /// Returns the base of a fresh region of `page_count` pages that does
    /// not overlap any region handed out before. The region's end must be
    /// representable by `Self::Addr`.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` when the backing resource is exhausted.
    fn acquire_space(&mut self, page_count: usize) -> Result<Self::Addr, Self::Error>;

    /// Returns a bucket's region to the backing resource. Called once per
    /// bucket when the owning allocator is dropped.
    fn release_space(&mut self, bucket: &StaticAllocator<Self::Addr>);
}

/// Occupancy snapshot of a [`DynAllocator`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DynAllocatorStats {
    /// Buckets acquired so far.
    pub bucket_count: usize,
    /// Page totals across every bucket.
    pub pages: AllocatorStats,
}

/// Growable allocator composed of fixed-size buckets.
///
/// Not thread-safe. Every bucket is released through the preallocator when
/// the allocator is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let mut descriptors = DynAllocator::new(DescriptorPools::new(device), 32);
///
/// let set = descriptors.alloc(1)?; // acquires the first pool
/// descriptors.dealloc(set);
/// ```
pub struct DynAllocator<P: Preallocator> {
    /// Source of bucket address ranges.
    preallocator: P,
    /// Buckets in creation order.
    buckets: Vec<StaticAllocator<P::Addr>>,
    /// Bucket the next search starts at.
    bucket_cursor: usize,
    /// Pages in every bucket.
    pages_per_bucket: usize,
}

impl<P: Preallocator> DynAllocator<P> {
    /// Creates an allocator with no buckets.
    ///
    /// # Panics
    ///
    /// Panics if `pages_per_bucket` is zero.
    #[must_use]
    pub fn new(preallocator: P, pages_per_bucket: usize) -> Self {
        assert!(pages_per_bucket > 0, "Pages per bucket must be greater than zero");

        Self {
            preallocator,
            buckets: Vec::new(),
            bucket_cursor: 0,
            pages_per_bucket,
        }
    }

    /// Creates an allocator from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the configuration is invalid or
    /// its page size disagrees with `P::PAGE_SIZE`.
    pub fn from_config(preallocator: P, config: &AllocatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.page_size != P::PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "page_size {} does not match the preallocator's page size {}",
                config.page_size,
                P::PAGE_SIZE
            )));
        }
        Ok(Self::new(preallocator, config.pages_per_bucket))
    }

    /// Pages in every bucket; the largest request that can succeed.
    #[inline]
    #[must_use]
    pub const fn pages_per_bucket(&self) -> usize {
        self.pages_per_bucket
    }

    /// Number of buckets acquired so far.
    #[inline]
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Buckets in creation order.
    #[inline]
    #[must_use]
    pub fn buckets(&self) -> &[StaticAllocator<P::Addr>] {
        &self.buckets
    }

    /// The backing resource.
    #[inline]
    #[must_use]
    pub const fn preallocator(&self) -> &P {
        &self.preallocator
    }

    /// The backing resource, mutably.
    #[inline]
    pub fn preallocator_mut(&mut self) -> &mut P {
        &mut self.preallocator
    }

    /// Acquires one more bucket ahead of demand.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Backing`] if the preallocator fails.
    ///
    /// # Panics
    ///
    /// Panics if the preallocator hands out a region whose end overflows
    /// the address type.
    pub fn grow(&mut self) -> Result<(), AllocError<P::Error>> {
        let base = self
            .preallocator
            .acquire_space(self.pages_per_bucket)
            .map_err(|error| {
                warn!(
                    error = %error,
                    pages = self.pages_per_bucket,
                    "preallocator could not provide a bucket"
                );
                AllocError::Backing(error)
            })?;

        debug!(
            bucket = self.buckets.len(),
            base = ?base,
            pages = self.pages_per_bucket,
            "acquired bucket"
        );
        self.buckets.push(StaticAllocator::with_page_size(
            base,
            self.pages_per_bucket,
            P::PAGE_SIZE,
        ));
        Ok(())
    }

    /// Tries to allocate `page_count` contiguous pages from some bucket,
    /// acquiring a new bucket if none has room.
    ///
    /// Returns `None` on any failure, including the preallocator's.
    pub fn try_alloc(&mut self, page_count: usize) -> Option<Allocation<P::Addr>> {
        self.occupy(page_count).ok()
    }

    /// Allocates `page_count` contiguous pages and returns the base address.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::OutOfPages`] for zero-sized requests and
    /// requests larger than a bucket, and [`AllocError::Backing`] with the
    /// preallocator's error if a needed bucket cannot be acquired.
    pub fn alloc(&mut self, page_count: usize) -> Result<P::Addr, AllocError<P::Error>> {
        self.occupy(page_count).map(|allocation| allocation.base)
    }

    fn occupy(&mut self, page_count: usize) -> Result<Allocation<P::Addr>, AllocError<P::Error>> {
        let out_of_pages = AllocError::OutOfPages {
            requested: page_count,
        };
        if page_count == 0 || page_count > self.pages_per_bucket {
            return Err(out_of_pages);
        }

        let bucket_count = self.buckets.len();
        for step in 0..bucket_count {
            let index = (self.bucket_cursor + step) % bucket_count;
            if let Some(allocation) = self.buckets[index].try_alloc(page_count, 0) {
                self.bucket_cursor = index;
                return Ok(allocation);
            }
        }

        self.grow()?;
        self.bucket_cursor = bucket_count;
        self.buckets[bucket_count]
            .try_alloc(page_count, 0)
            .ok_or(out_of_pages)
    }

    /// Frees the allocation starting at `base`.
    ///
    /// Freeing an address no bucket owns is a caller bug: asserted in debug
    /// builds, ignored otherwise.
    pub fn dealloc(&mut self, base: P::Addr) {
        let freed = self.try_dealloc(base);
        debug_assert!(freed, "{base:?} is not a live allocation of any bucket");
    }

    /// Frees the allocation starting at `base` if one exists.
    ///
    /// Returns `false`, changing nothing, if no bucket owns `base` or it is
    /// not the start of a live allocation.
    pub fn try_dealloc(&mut self, base: P::Addr) -> bool {
        let Some(index) = self.owning_bucket(base) else {
            warn!(address = ?base, "dealloc of an address no bucket owns");
            return false;
        };

        let freed = self.buckets[index].try_dealloc(base);
        if freed {
            self.bucket_cursor = index;
        }
        freed
    }

    /// Grows or shrinks the allocation at `base` in place inside its
    /// bucket. See [`StaticAllocator::try_resize`].
    pub fn try_resize(&mut self, base: P::Addr, new_page_count: usize) -> bool {
        match self.owning_bucket(base) {
            Some(index) => self.buckets[index].try_resize(base, new_page_count),
            None => false,
        }
    }

    /// Occupancy across all buckets.
    #[must_use]
    pub fn stats(&self) -> DynAllocatorStats {
        let mut pages = AllocatorStats::default();
        for bucket in &self.buckets {
            pages.absorb(&bucket.stats());
        }
        DynAllocatorStats {
            bucket_count: self.buckets.len(),
            pages,
        }
    }

    /// Round-robin from the cursor for the bucket whose window holds
    /// `address`.
    fn owning_bucket(&self, address: P::Addr) -> Option<usize> {
        let bucket_count = self.buckets.len();
        (0..bucket_count)
            .map(|step| (self.bucket_cursor + step) % bucket_count)
            .find(|&index| self.buckets[index].contains(address))
    }
}

impl<P: Preallocator> Drop for DynAllocator<P> {
    fn drop(&mut self) {
        for (index, bucket) in self.buckets.iter().enumerate() {
            debug!(bucket = index, base = ?bucket.base(), "releasing bucket");
            self.preallocator.release_space(bucket);
        }
    }
}

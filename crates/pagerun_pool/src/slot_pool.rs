//! # Slot Pool
//!
//! Reusable resources addressed by slot index.
//!
//! Occupancy is tracked by a [`DynAllocator`] over `usize` addresses with a
//! page size of one, so a page *is* a slot. The allocator's preallocator
//! is the resource factory: acquiring a bucket of `n` pages creates `n`
//! resources at the end of the vector and returns the index of the first.

use std::error::Error;
use std::marker::PhantomData;

use pagerun_core::{
    AllocError, ConfigFile, DynAllocator, DynAllocatorStats, PageStatus, Preallocator,
    StaticAllocator,
};
use tracing::debug;

use crate::config::SlotPoolConfig;
use crate::error::PoolError;

/// Handle to an acquired slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Slot {
    /// Index into the pool's resources.
    index: usize,
}

impl Slot {
    /// Index of the slot's resource; stable for the pool's lifetime.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }
}

/// Creates resources in batches on behalf of the allocator.
struct Spawner<T, E, F> {
    /// Every resource ever created, indexed by slot.
    resources: Vec<T>,
    /// Builds the resource for a given slot index.
    factory: F,
    _error: PhantomData<fn() -> E>,
}

impl<T, E, F> Preallocator for Spawner<T, E, F>
where
    F: FnMut(usize) -> Result<T, E>,
    E: Error + 'static,
{
    type Addr = usize;
    type Error = E;

    fn acquire_space(&mut self, page_count: usize) -> Result<usize, E> {
        let first = self.resources.len();
        let mut batch = Vec::with_capacity(page_count);
        for index in first..first + page_count {
            batch.push((self.factory)(index)?);
        }
        self.resources.append(&mut batch);
        Ok(first)
    }

    fn release_space(&mut self, bucket: &StaticAllocator<usize>) {
        // Resources live in `resources` and are dropped with the pool.
        debug!(
            first = bucket.base(),
            slots = bucket.page_count(),
            "retiring slot batch"
        );
    }
}

/// A growable pool of reusable resources.
///
/// Released slots are handed out again before any new resource is created.
/// Resources are never destroyed before the pool itself.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap in a mutex.
pub struct SlotPool<T, E, F>
where
    F: FnMut(usize) -> Result<T, E>,
    E: Error + 'static,
{
    /// Slot occupancy plus the resources themselves.
    slots: DynAllocator<Spawner<T, E, F>>,
    /// Slots currently acquired.
    in_use: usize,
}

impl<T, E, F> SlotPool<T, E, F>
where
    F: FnMut(usize) -> Result<T, E>,
    E: Error + 'static,
{
    /// Creates a pool, eagerly building `config.initial_batches` batches.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] if `config` fails validation and
    /// [`PoolError::Alloc`] if the factory fails while building the initial
    /// batches.
    pub fn new(config: &SlotPoolConfig, factory: F) -> Result<Self, PoolError<E>> {
        config.validate()?;
        let spawner = Spawner {
            resources: Vec::with_capacity(config.slots_per_batch * config.initial_batches),
            factory,
            _error: PhantomData,
        };
        let mut slots = DynAllocator::new(spawner, config.slots_per_batch);
        for _ in 0..config.initial_batches {
            slots.grow()?;
        }

        Ok(Self { slots, in_use: 0 })
    }

    /// Acquires a free slot, creating a new batch of resources if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Backing`] with the factory's error if a new
    /// batch was needed and could not be built.
    pub fn acquire(&mut self) -> Result<Slot, AllocError<E>> {
        let index = self.slots.alloc(1)?;
        self.in_use += 1;
        Ok(Slot { index })
    }

    /// Returns a slot to the pool. Returns `false` if it was not in use.
    pub fn release(&mut self, slot: Slot) -> bool {
        let released = self.slots.try_dealloc(slot.index);
        if released {
            self.in_use -= 1;
        }
        released
    }

    /// Whether `slot` is currently acquired.
    #[must_use]
    pub fn is_in_use(&self, slot: Slot) -> bool {
        self.slots
            .buckets()
            .iter()
            .find(|bucket| bucket.contains(slot.index))
            .and_then(|bucket| bucket.page_status(slot.index - bucket.base()))
            .is_some_and(PageStatus::is_taken)
    }

    /// The resource behind an acquired slot.
    #[must_use]
    pub fn get(&self, slot: Slot) -> Option<&T> {
        if !self.is_in_use(slot) {
            return None;
        }
        self.slots.preallocator().resources.get(slot.index)
    }

    /// The resource behind an acquired slot, mutably.
    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut T> {
        if !self.is_in_use(slot) {
            return None;
        }
        self.slots.preallocator_mut().resources.get_mut(slot.index)
    }

    /// Every resource created so far, in slot order, acquired or not.
    #[must_use]
    pub fn resources(&self) -> &[T] {
        &self.slots.preallocator().resources
    }

    /// Total slots created so far.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.preallocator().resources.len()
    }

    /// Slots currently acquired.
    #[inline]
    #[must_use]
    pub const fn in_use(&self) -> usize {
        self.in_use
    }

    /// Slots created but not acquired.
    #[inline]
    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity() - self.in_use
    }

    /// Occupancy of the underlying allocator.
    #[must_use]
    pub fn stats(&self) -> DynAllocatorStats {
        self.slots.stats()
    }
}

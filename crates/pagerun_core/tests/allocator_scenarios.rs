//! Integration tests for the documented allocator scenarios.

use std::convert::Infallible;

use pagerun_core::{AllocError, DynAllocator, PageStatus, Preallocator, StaticAllocator};

/// Hands out `0, 4, 8, ...` and counts acquisitions.
#[derive(Default)]
struct CountingPreallocator {
    next: usize,
    acquire_calls: usize,
}

impl Preallocator for CountingPreallocator {
    type Addr = usize;
    type Error = Infallible;

    fn acquire_space(&mut self, page_count: usize) -> Result<usize, Infallible> {
        let base = self.next;
        self.next += page_count;
        self.acquire_calls += 1;
        Ok(base)
    }

    fn release_space(&mut self, _bucket: &StaticAllocator<usize>) {}
}

#[test]
fn test_static_allocator_whole_window() {
    let mut alloc = StaticAllocator::new(0usize, 8);

    let whole = alloc.try_alloc(8, 0).unwrap();
    assert_eq!(whole.base, 0);
    assert_eq!(whole.page_count, 8);

    assert!(alloc.try_alloc(1, 0).is_none());

    alloc.dealloc(0);
    let again = alloc.try_alloc(8, 0).unwrap();
    assert_eq!((again.base, again.page_count), (0, 8));

    assert!(alloc.try_alloc(9, 0).is_none());
    assert_eq!(alloc.alloc(9, 0), Err(AllocError::OutOfPages { requested: 9 }));
}

#[test]
fn test_dyn_allocator_bucket_reuse() {
    let mut alloc = DynAllocator::new(CountingPreallocator::default(), 4);

    assert_eq!(alloc.alloc(4).unwrap(), 0);
    assert_eq!(alloc.preallocator().acquire_calls, 1);

    assert_eq!(alloc.alloc(4).unwrap(), 4);
    assert_eq!(alloc.preallocator().acquire_calls, 2);

    alloc.dealloc(0);
    assert_eq!(alloc.alloc(4).unwrap(), 0);
    assert_eq!(alloc.preallocator().acquire_calls, 2);

    alloc.dealloc(0);
    alloc.dealloc(4);
    assert_eq!(alloc.stats().pages.free_pages, 8);
    assert!(alloc.try_alloc(5).is_none());
    assert_eq!(alloc.alloc(5), Err(AllocError::OutOfPages { requested: 5 }));
    assert_eq!(alloc.preallocator().acquire_calls, 2);
}

#[test]
fn test_dyn_allocator_round_robin_dealloc() {
    let mut alloc = DynAllocator::new(CountingPreallocator::default(), 2);
    let bases: Vec<usize> = (0..6).map(|_| alloc.alloc(1).unwrap()).collect();
    assert_eq!(alloc.bucket_count(), 3);

    for &base in bases.iter().rev() {
        assert!(alloc.try_dealloc(base));
    }
    let stats = alloc.stats();
    assert_eq!(stats.bucket_count, 3);
    assert_eq!(stats.pages.allocations, 0);
    assert_eq!(stats.pages.largest_free_run, 2);
}

#[test]
fn test_slot_pool_usage_pattern() {
    // Fence slots: one page per fence, address == index.
    let mut fences = StaticAllocator::new(0usize, 32);
    let mut taken = Vec::new();
    while let Some(slot) = fences.try_alloc(1, 0) {
        taken.push(slot.base);
    }
    assert_eq!(taken.len(), 32);

    taken.sort_unstable();
    assert_eq!(taken, (0..32).collect::<Vec<_>>());

    fences.dealloc(17);
    assert_eq!(fences.alloc(1, 0).unwrap(), 17);
}

#[test]
fn test_page_status_introspection() {
    let mut alloc = StaticAllocator::new(0usize, 4);
    alloc.alloc(3, 0).unwrap();

    assert_eq!(alloc.page_status(0), Some(PageStatus::Occupied));
    assert_eq!(alloc.page_status(2), Some(PageStatus::AllocationEnd));
    assert_eq!(alloc.page_status(3), Some(PageStatus::Free));
    assert_eq!(alloc.to_string(), "##].");
}

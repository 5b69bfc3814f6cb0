//! # Static Allocator
//!
//! Allocates contiguous page runs inside one fixed address window.
//!
//! ## Search Heuristic
//!
//! Free runs are searched by probing offsets at a *stride*. The stride
//! starts at half the window, so early allocations land on widely spaced,
//! well aligned offsets, and halves every time a full pass finds nothing:
//!
//! ```text
//!   pages: 16      stride 8:  0 . . . . . . . 8 . . . . . . .
//!                  stride 4:  0 . . . 4 . . . 8 . . . 12. . .
//!                  stride 2:  0 . 2 . 4 . 6 . 8 . ...
//! ```
//!
//! Freeing a run whose offset is aligned coarser than the current stride
//! restores the coarse stride. A search that has scanned every offset and
//! found nothing is remembered until the next free, so a full allocator
//! answers repeated requests without rescanning.

use std::fmt;

use tracing::{trace, warn};

use super::bitmap::{PageBitmap, PageStatus};
use super::stats::AllocatorStats;
use crate::address::Address;
use crate::error::{AllocError, AllocResult};

/// A live allocation: `page_count` pages starting at `base`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Allocation<A> {
    /// Address of the first page.
    pub base: A,
    /// Number of pages; never zero.
    pub page_count: usize,
}

/// The coarsest stride for a window of `page_count` pages.
#[inline]
fn initial_stride(page_count: usize) -> usize {
    (page_count / 2).max(1)
}

/// Stride actually probed: a multiple of the requested alignment.
#[inline]
fn probe_stride(stride: usize, min_alignment: usize) -> usize {
    if min_alignment > 1 {
        stride.next_multiple_of(min_alignment)
    } else {
        stride
    }
}

/// A search pass that ran from offset 0 to the end of the window and found
/// no room.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SearchFailure {
    /// Finest stride that was scanned in full.
    stride: usize,
    /// Pages that were asked for.
    pages: usize,
}

impl SearchFailure {
    /// Every offset was probed, so no free run of `pages` exists anywhere.
    #[inline]
    const fn is_exhaustive(self) -> bool {
        self.stride == 1
    }

    /// Whether this failure proves a request for `pages` cannot succeed.
    #[inline]
    const fn rules_out(self, pages: usize) -> bool {
        self.is_exhaustive() && pages >= self.pages
    }
}

/// Fixed-capacity page allocator over `[base, base + page_count * page_size)`.
///
/// Not thread-safe; callers sharing one across threads must serialize
/// access themselves. Move-only: the bitmap is never duplicated.
///
/// # Example
///
/// ```rust,ignore
/// let mut slots = StaticAllocator::new(0usize, 64);
///
/// let fence = slots.alloc(1, 0)?;
/// let batch = slots.try_alloc(8, 8).expect("aligned batch");
///
/// slots.dealloc(fence);
/// slots.dealloc(batch.base);
/// ```
#[derive(Debug)]
pub struct StaticAllocator<A: Address> {
    /// Address of page 0.
    base: A,
    /// Address units per page.
    page_size: usize,
    /// Occupancy of every page in the window.
    bitmap: PageBitmap,
    /// Stride the next search starts with.
    cur_stride: usize,
    /// Offset the next search starts from.
    cur_cursor: usize,
    /// Most recent failed search since the last free.
    last_fail: Option<SearchFailure>,
}

impl<A: Address> StaticAllocator<A> {
    /// Creates an allocator over `page_count` one-unit pages starting at
    /// `base`.
    ///
    /// # Panics
    ///
    /// Panics if `page_count` is zero.
    #[must_use]
    pub fn new(base: A, page_count: usize) -> Self {
        Self::with_page_size(base, page_count, 1)
    }

    /// Creates an allocator over `page_count` pages of `page_size` address
    /// units each, starting at `base`.
    ///
    /// # Panics
    ///
    /// Panics if `page_count` or `page_size` is zero, or if the window end
    /// `base + page_count * page_size` is not representable by `A`.
    #[must_use]
    pub fn with_page_size(base: A, page_count: usize, page_size: usize) -> Self {
        assert!(page_count > 0, "Page count must be greater than zero");
        assert!(page_size > 0, "Page size must be greater than zero");
        let end = page_count
            .checked_mul(page_size)
            .and_then(|length| base.checked_offset_by(length));
        assert!(
            end.is_some(),
            "Window of {page_count} pages of {page_size} at {base:?} overflows the address space"
        );

        Self {
            base,
            page_size,
            bitmap: PageBitmap::new(page_count),
            cur_stride: initial_stride(page_count),
            cur_cursor: 0,
            last_fail: None,
        }
    }

    /// Address of the first page.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> A {
        self.base
    }

    /// Number of pages in the window.
    #[inline]
    #[must_use]
    pub const fn page_count(&self) -> usize {
        self.bitmap.page_count()
    }

    /// Address units per page.
    #[inline]
    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// One past the last address of the window.
    #[inline]
    #[must_use]
    pub fn end(&self) -> A {
        self.base.offset_by(self.page_count() * self.page_size)
    }

    /// Whether `address` falls inside this allocator's window.
    #[inline]
    #[must_use]
    pub fn contains(&self, address: A) -> bool {
        address >= self.base && address < self.end()
    }

    /// Stride the next search will start probing with.
    #[inline]
    #[must_use]
    pub const fn current_stride(&self) -> usize {
        self.cur_stride
    }

    /// Offset the next search will start probing from.
    #[inline]
    #[must_use]
    pub const fn current_cursor(&self) -> usize {
        self.cur_cursor
    }

    /// Finest stride fully scanned by a failed search since the last free.
    #[inline]
    #[must_use]
    pub fn last_fail_stride(&self) -> Option<usize> {
        self.last_fail.map(|failure| failure.stride)
    }

    /// Tries to allocate `page_count` contiguous pages.
    ///
    /// With `min_alignment_pages > 0` the returned offset (in pages from
    /// `base`) is a multiple of it. Returns `None` when no suitable run is
    /// found; the search is heuristic, so a run may exist at an offset the
    /// strides never visit.
    pub fn try_alloc(
        &mut self,
        page_count: usize,
        min_alignment_pages: usize,
    ) -> Option<Allocation<A>> {
        if page_count == 0 || page_count > self.page_count() {
            return None;
        }
        if self.last_fail.is_some_and(|failure| failure.rules_out(page_count)) {
            return None;
        }

        let stop_below_stride = if min_alignment_pages > 0 {
            min_alignment_pages
        } else {
            page_count
        };
        let max_offset = self.page_count() - page_count;
        let mut stride = self.cur_stride;
        let mut cursor = self.cur_cursor;

        let found = loop {
            let probe = probe_stride(stride, min_alignment_pages);
            let from_start = cursor == 0;
            if let Some(offset) =
                self.bitmap
                    .find_free_run(page_count, probe, max_offset, &mut cursor)
            {
                break Some(offset);
            }

            cursor = 0;
            if !from_start {
                // Offsets before the cursor are still unprobed at this stride.
                continue;
            }
            self.record_failure(SearchFailure {
                stride: probe,
                pages: page_count,
            });

            let halved = stride / 2;
            if halved >= stop_below_stride {
                stride = halved;
            } else if min_alignment_pages > 1 && probe > min_alignment_pages {
                // Rounded-up probes skip some aligned offsets.
                stride = min_alignment_pages;
            } else {
                stride = halved;
                break None;
            }
            trace!(stride, page_count, "no fit, narrowing search stride");
        };

        self.cur_stride = stride.max(1);
        self.cur_cursor = if cursor < self.page_count() { cursor } else { 0 };

        let offset = found?;
        self.bitmap.fill_run(offset, page_count);
        self.last_fail = None;
        Some(Allocation {
            base: self.address_of(offset),
            page_count,
        })
    }

    /// Allocates `page_count` contiguous pages and returns the base address.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::OutOfPages`] when [`Self::try_alloc`] finds no
    /// run.
    pub fn alloc(&mut self, page_count: usize, min_alignment_pages: usize) -> AllocResult<A> {
        self.try_alloc(page_count, min_alignment_pages)
            .map(|allocation| allocation.base)
            .ok_or(AllocError::OutOfPages {
                requested: page_count,
            })
    }

    /// Frees the allocation starting at `base`.
    ///
    /// `base` must be an address returned by this allocator and not yet
    /// freed. Anything else is asserted in debug builds and ignored in
    /// release builds.
    pub fn dealloc(&mut self, base: A) {
        let freed = self.try_dealloc(base);
        debug_assert!(freed, "{base:?} is not a live allocation of this allocator");
    }

    /// Frees the allocation starting at `base` if there is one.
    ///
    /// Returns `false`, changing nothing, when `base` lies outside the
    /// window or is not the first page of a live allocation.
    pub fn try_dealloc(&mut self, base: A) -> bool {
        let Some(offset) = self.live_run_at(base) else {
            warn!(address = ?base, "dealloc of an address that is not a live allocation");
            return false;
        };

        self.bitmap.erase_run(offset);
        self.retune_after_free(offset);
        true
    }

    /// Grows or shrinks the allocation at `base` in place.
    ///
    /// Fails, leaving every page untouched, if `base` is not a live
    /// allocation, `new_page_count` is zero, or growing would run into
    /// another allocation or past the window. The search stride and cursor
    /// are left alone.
    pub fn try_resize(&mut self, base: A, new_page_count: usize) -> bool {
        let Some(offset) = self.live_run_at(base) else {
            return false;
        };
        let old_page_count = self.bitmap.run_len(offset);

        if !self.bitmap.try_resize_run(offset, new_page_count) {
            return false;
        }
        if old_page_count.is_some_and(|old| new_page_count < old) {
            // Pages were freed: a recorded "nothing fits" may be stale.
            self.last_fail = None;
        }
        true
    }

    /// Page count of the live allocation starting at `base`.
    #[must_use]
    pub fn allocation_len(&self, base: A) -> Option<usize> {
        self.live_run_at(base)
            .and_then(|offset| self.bitmap.run_len(offset))
    }

    /// State of the page at `offset` (in pages from `base`).
    #[must_use]
    pub fn page_status(&self, offset: usize) -> Option<PageStatus> {
        (offset < self.page_count()).then(|| self.bitmap.get(offset))
    }

    /// Calls `visit` with the address and state of every page in order.
    pub fn dump_pages<F>(&self, mut visit: F)
    where
        F: FnMut(A, PageStatus),
    {
        for (offset, status) in self.bitmap.iter().enumerate() {
            visit(self.address_of(offset), status);
        }
    }

    /// Occupancy snapshot.
    #[must_use]
    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats::from_bitmap(&self.bitmap)
    }

    /// Frees every allocation and restores the initial search state.
    pub fn reset(&mut self) {
        self.bitmap.clear();
        self.cur_stride = initial_stride(self.page_count());
        self.cur_cursor = 0;
        self.last_fail = None;
    }

    #[inline]
    fn address_of(&self, offset: usize) -> A {
        self.base.offset_by(offset * self.page_size)
    }

    /// Page offset of `address` if it is a page boundary inside the window.
    fn offset_of(&self, address: A) -> Option<usize> {
        if !self.contains(address) {
            return None;
        }
        let distance = address.distance_from(self.base);
        (distance % self.page_size == 0).then_some(distance / self.page_size)
    }

    /// Page offset of `address` if a live allocation starts there.
    fn live_run_at(&self, address: A) -> Option<usize> {
        let offset = self.offset_of(address)?;
        let starts_run = self.bitmap.get(offset).is_taken()
            && (offset == 0 || self.bitmap.get(offset - 1) != PageStatus::Occupied);
        starts_run.then_some(offset)
    }

    /// Keeps an exhaustive failure over a less informative one.
    fn record_failure(&mut self, failure: SearchFailure) {
        let keep_existing = self
            .last_fail
            .is_some_and(|existing| existing.is_exhaustive() && !failure.is_exhaustive());
        if !keep_existing {
            self.last_fail = Some(failure);
        }
    }

    fn retune_after_free(&mut self, offset: usize) {
        let mut alignment = initial_stride(self.page_count());
        while offset % alignment != 0 {
            alignment /= 2;
        }

        if alignment > self.cur_stride {
            trace!(
                from = self.cur_stride,
                to = alignment,
                offset,
                "free reopened a coarser gap"
            );
            self.cur_stride = alignment;
            self.cur_cursor = 0;
        } else if alignment == self.cur_stride && self.cur_cursor < offset {
            self.cur_cursor = offset;
        }

        self.last_fail = None;
    }
}

impl<A: Address> fmt::Display for StaticAllocator<A> {
    /// One character per page: `.` free, `#` occupied, `]` allocation end.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for status in self.bitmap.iter() {
            let glyph = match status {
                PageStatus::Free => '.',
                PageStatus::Occupied => '#',
                PageStatus::AllocationEnd => ']',
            };
            fmt::Write::write_char(f, glyph)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Brute force: is there any free run of `length` pages at all?
    fn any_free_run(alloc: &StaticAllocator<usize>, length: usize) -> bool {
        let mut run = 0;
        for status in alloc.bitmap.iter() {
            run = if status.is_free() { run + 1 } else { 0 };
            if run >= length {
                return true;
            }
        }
        false
    }

    #[test]
    fn test_initial_state() {
        let alloc = StaticAllocator::new(100usize, 16);
        assert_eq!(alloc.base(), 100);
        assert_eq!(alloc.end(), 116);
        assert_eq!(alloc.current_stride(), 8);
        assert_eq!(alloc.current_cursor(), 0);
        assert_eq!(alloc.last_fail_stride(), None);

        let single = StaticAllocator::new(0usize, 1);
        assert_eq!(single.current_stride(), 1);
    }

    #[test]
    fn test_first_allocations_are_spread_out() {
        let mut alloc = StaticAllocator::new(0usize, 16);
        let a = alloc.try_alloc(1, 0).unwrap();
        let b = alloc.try_alloc(1, 0).unwrap();
        assert_eq!(a.base, 0);
        assert_eq!(b.base, 8);
        assert_eq!(alloc.to_string(), "].......].......");
    }

    #[test]
    fn test_zero_pages_fails() {
        let mut alloc = StaticAllocator::new(0usize, 8);
        assert!(alloc.try_alloc(0, 0).is_none());
        assert_eq!(
            alloc.alloc(0, 0),
            Err(AllocError::OutOfPages { requested: 0 })
        );
    }

    #[test]
    fn test_page_size_scales_addresses() {
        let mut alloc = StaticAllocator::with_page_size(0x1000u64, 4, 0x100);
        let allocation = alloc.try_alloc(2, 0).unwrap();
        assert_eq!(allocation.base, 0x1000);
        let second = alloc.alloc(2, 0).unwrap();
        assert_eq!(second, 0x1200);
        assert!(alloc.contains(0x13ff));
        assert!(!alloc.contains(0x1400));

        // Not on a page boundary.
        assert!(!alloc.try_dealloc(0x1080));
        assert!(alloc.try_dealloc(0x1200));
    }

    #[test]
    fn test_full_allocator_fails_fast_until_free() {
        let mut alloc = StaticAllocator::new(0usize, 4);
        for _ in 0..4 {
            alloc.alloc(1, 0).unwrap();
        }

        assert!(alloc.try_alloc(1, 0).is_none());
        assert_eq!(alloc.last_fail_stride(), Some(1));
        // Served by the remembered failure.
        assert!(alloc.try_alloc(2, 0).is_none());

        alloc.dealloc(2);
        assert_eq!(alloc.last_fail_stride(), None);
        assert_eq!(alloc.try_alloc(1, 0).unwrap().base, 2);
    }

    #[test]
    fn test_remembered_failure_does_not_block_smaller_requests() {
        let mut alloc = StaticAllocator::new(0usize, 8);
        alloc.fill_for_test(&[0, 2, 4, 6]);

        // Exhaustive pass at stride 1 finds no room for two pages...
        assert!(alloc.try_alloc(2, 1).is_none());
        assert_eq!(alloc.last_fail_stride(), Some(1));
        // ...but single pages are still there.
        assert_eq!(alloc.try_alloc(1, 0).unwrap().page_count, 1);
    }

    #[test]
    fn test_alignment_respected() {
        let mut alloc = StaticAllocator::new(0usize, 12);
        alloc.alloc(1, 0).unwrap();

        let aligned = alloc.try_alloc(2, 4).unwrap();
        assert_eq!(aligned.base % 4, 0);
        assert_ne!(aligned.base, 0);
    }

    #[test]
    fn test_alignment_sweep_reaches_every_aligned_offset() {
        let mut alloc = StaticAllocator::new(0usize, 12);
        let taken: Vec<usize> = (0..12).filter(|&offset| offset != 2).collect();
        alloc.fill_for_test(&taken);

        // Strides 6 and 3 probe 0, 6 and 0, 4, 8; only a pass at the
        // alignment itself visits offset 2.
        let aligned = alloc.try_alloc(1, 2).unwrap();
        assert_eq!(aligned.base, 2);
        assert!(alloc.try_alloc(1, 2).is_none());
    }

    #[test]
    fn test_window_at_top_of_address_space() {
        let mut alloc = StaticAllocator::new(u32::MAX - 4, 4);
        assert_eq!(alloc.end(), u32::MAX);

        let mut bases = Vec::new();
        while let Some(allocation) = alloc.try_alloc(1, 0) {
            bases.push(allocation.base);
        }
        bases.sort_unstable();
        assert_eq!(
            bases,
            vec![u32::MAX - 4, u32::MAX - 3, u32::MAX - 2, u32::MAX - 1]
        );

        for base in bases {
            assert!(alloc.try_dealloc(base));
        }
        assert_eq!(alloc.stats().free_pages, 4);
    }

    #[test]
    #[should_panic(expected = "overflows the address space")]
    fn test_window_past_address_space_rejected() {
        let _ = StaticAllocator::new(u32::MAX - 1, 4);
    }

    #[test]
    #[should_panic(expected = "overflows the address space")]
    fn test_window_length_overflow_rejected() {
        let _ = StaticAllocator::with_page_size(0u64, usize::MAX, 2);
    }

    #[test]
    fn test_dealloc_restores_coarse_stride() {
        let mut alloc = StaticAllocator::new(0usize, 8);
        let bases: Vec<usize> = (0..8).map(|_| alloc.alloc(1, 0).unwrap()).collect();
        assert_eq!(alloc.current_stride(), 1);

        alloc.dealloc(bases.iter().copied().find(|&b| b == 4).unwrap());
        assert_eq!(alloc.current_stride(), 4);
        assert_eq!(alloc.current_cursor(), 0);
        assert_eq!(alloc.try_alloc(1, 0).unwrap().base, 4);
    }

    #[test]
    fn test_dealloc_moves_cursor_to_gap_at_same_stride() {
        let mut alloc = StaticAllocator::new(0usize, 8);
        for _ in 0..8 {
            alloc.alloc(1, 0).unwrap();
        }
        // Two failures drive the stride down to 1 with cursor at 0.
        alloc.dealloc(5);
        assert_eq!(alloc.current_stride(), 1);
        assert_eq!(alloc.current_cursor(), 5);
    }

    #[test]
    fn test_foreign_and_double_free_are_rejected() {
        let mut alloc = StaticAllocator::new(10usize, 8);
        let run = alloc.try_alloc(3, 0).unwrap();

        assert!(!alloc.try_dealloc(9));
        assert!(!alloc.try_dealloc(18));
        assert!(!alloc.try_dealloc(run.base + 1));
        assert!(alloc.try_dealloc(run.base));
        assert!(!alloc.try_dealloc(run.base));
        assert_eq!(alloc.stats().free_pages, 8);
    }

    #[test]
    fn test_resize_in_place() {
        let mut alloc = StaticAllocator::new(0usize, 8);
        let a = alloc.alloc(2, 0).unwrap();
        let b = alloc.alloc(2, 0).unwrap();
        assert_eq!((a, b), (0, 4));

        assert!(alloc.try_resize(a, 4));
        assert_eq!(alloc.allocation_len(a), Some(4));
        assert!(!alloc.try_resize(a, 5));
        assert_eq!(alloc.allocation_len(a), Some(4));
        assert_eq!(alloc.allocation_len(b), Some(2));

        assert!(alloc.try_resize(a, 1));
        assert_eq!(alloc.to_string(), "]...#]..");
        assert!(!alloc.try_resize(a + 1, 2));
    }

    #[test]
    fn test_shrink_clears_remembered_failure() {
        let mut alloc = StaticAllocator::new(0usize, 4);
        let whole = alloc.alloc(4, 0).unwrap();
        assert!(alloc.try_alloc(1, 0).is_none());
        assert_eq!(alloc.last_fail_stride(), Some(1));

        assert!(alloc.try_resize(whole, 2));
        assert_eq!(alloc.last_fail_stride(), None);
        assert!(alloc.try_alloc(1, 0).is_some());
    }

    #[test]
    fn test_dump_pages_and_status() {
        let mut alloc = StaticAllocator::with_page_size(0usize, 4, 16);
        alloc.alloc(2, 0).unwrap();

        let mut seen = Vec::new();
        alloc.dump_pages(|address, status| seen.push((address, status)));
        assert_eq!(
            seen,
            vec![
                (0, PageStatus::Occupied),
                (16, PageStatus::AllocationEnd),
                (32, PageStatus::Free),
                (48, PageStatus::Free),
            ]
        );
        assert_eq!(alloc.page_status(1), Some(PageStatus::AllocationEnd));
        assert_eq!(alloc.page_status(4), None);
    }

    #[test]
    fn test_reset() {
        let mut alloc = StaticAllocator::new(0usize, 8);
        for _ in 0..8 {
            alloc.alloc(1, 0).unwrap();
        }
        alloc.reset();
        assert_eq!(alloc.stats().free_pages, 8);
        assert_eq!(alloc.current_stride(), 4);
        assert_eq!(alloc.alloc(8, 0).unwrap(), 0);
    }

    /// The remembered failure must never reject a request a full scan
    /// would have satisfied.
    #[test]
    fn test_fast_fail_never_hides_a_fit() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);

        for page_count in [1, 7, 16, 33, 64] {
            let mut alloc = StaticAllocator::new(0usize, page_count);
            let mut live: Vec<usize> = Vec::new();

            for _ in 0..2_000 {
                if live.is_empty() || rng.gen_bool(0.6) {
                    let pages = rng.gen_range(1..=page_count.min(8));
                    let guarded = alloc.last_fail.is_some_and(|f| f.rules_out(pages));
                    match alloc.try_alloc(pages, 0) {
                        Some(allocation) => live.push(allocation.base),
                        None if guarded => assert!(
                            !any_free_run(&alloc, pages),
                            "fast-fail hid a run of {pages} in {alloc}"
                        ),
                        None => {}
                    }
                } else {
                    let victim = live.swap_remove(rng.gen_range(0..live.len()));
                    alloc.dealloc(victim);
                }
            }
        }
    }

    impl StaticAllocator<usize> {
        /// Marks single-page allocations at `offsets` directly.
        fn fill_for_test(&mut self, offsets: &[usize]) {
            for &offset in offsets {
                self.bitmap.fill_run(offset, 1);
            }
        }
    }
}

//! # Occupancy Statistics
//!
//! Snapshots computed by walking a bitmap. Cheap enough for debug overlays
//! and tests, not meant for the allocation hot path.

use std::fmt;

use super::bitmap::{PageBitmap, PageStatus};

/// Occupancy snapshot of one allocator (or the sum over many).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Total pages managed.
    pub page_count: usize,
    /// Pages not part of any allocation.
    pub free_pages: usize,
    /// Pages belonging to live allocations.
    pub occupied_pages: usize,
    /// Number of live allocations.
    pub allocations: usize,
    /// Longest contiguous run of free pages.
    pub largest_free_run: usize,
}

impl AllocatorStats {
    pub(crate) fn from_bitmap(bitmap: &PageBitmap) -> Self {
        let mut stats = Self {
            page_count: bitmap.page_count(),
            ..Self::default()
        };
        let mut free_run = 0;

        for status in bitmap.iter() {
            match status {
                PageStatus::Free => {
                    stats.free_pages += 1;
                    free_run += 1;
                    stats.largest_free_run = stats.largest_free_run.max(free_run);
                }
                PageStatus::Occupied => {
                    stats.occupied_pages += 1;
                    free_run = 0;
                }
                PageStatus::AllocationEnd => {
                    stats.occupied_pages += 1;
                    stats.allocations += 1;
                    free_run = 0;
                }
            }
        }

        stats
    }

    /// Adds another allocator's snapshot into this one.
    ///
    /// Free runs never span allocators, so the largest run is the maximum of
    /// the two rather than a sum.
    pub fn absorb(&mut self, other: &Self) {
        self.page_count += other.page_count;
        self.free_pages += other.free_pages;
        self.occupied_pages += other.occupied_pages;
        self.allocations += other.allocations;
        self.largest_free_run = self.largest_free_run.max(other.largest_free_run);
    }

    /// Fraction of pages in use, in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn occupancy(&self) -> f64 {
        if self.page_count == 0 {
            return 0.0;
        }
        self.occupied_pages as f64 / self.page_count as f64
    }
}

impl fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} pages used in {} allocation(s), largest free run {}",
            self.occupied_pages, self.page_count, self.allocations, self.largest_free_run
        )
    }
}

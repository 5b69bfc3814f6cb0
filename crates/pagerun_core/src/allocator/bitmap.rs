//! # Page Bitmap
//!
//! Two bits of occupancy state per page, packed sixteen pages to a `u32`.
//!
//! ```text
//!   bit 1 (end) ─┐┌─ bit 0 (taken)
//!                00  Free
//!                01  Occupied        interior page of a live allocation
//!                11  AllocationEnd   last page of a live allocation
//! ```
//!
//! Allocation lengths are never stored: a run is recovered by walking
//! forward from its first page until the `AllocationEnd` marker.

use std::cmp::Ordering;

/// Bits of state kept for every page.
const BITS_PER_PAGE: usize = 2;

/// Pages packed into one storage word.
const PAGES_PER_WORD: usize = u32::BITS as usize / BITS_PER_PAGE;

/// Mask selecting one page's bits once shifted down.
const PAGE_MASK: u32 = 0b11;

/// Occupancy state of a single page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PageStatus {
    /// Not part of any allocation.
    Free = 0b00,
    /// Interior page of a live allocation.
    Occupied = 0b01,
    /// Last page of a live allocation.
    AllocationEnd = 0b11,
}

impl PageStatus {
    const TAKEN_BIT: u32 = 0b01;
    const END_BIT: u32 = 0b10;

    #[inline]
    const fn from_bits(bits: u32) -> Self {
        if bits & Self::TAKEN_BIT == 0 {
            Self::Free
        } else if bits & Self::END_BIT == 0 {
            Self::Occupied
        } else {
            Self::AllocationEnd
        }
    }

    #[inline]
    const fn bits(self) -> u32 {
        self as u32
    }

    /// Returns true for [`PageStatus::Free`].
    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }

    /// Returns true if the page belongs to a live allocation.
    #[inline]
    #[must_use]
    pub const fn is_taken(self) -> bool {
        !self.is_free()
    }
}

/// Packed tri-state occupancy record over a fixed number of pages.
///
/// The storage is owned exclusively and is never cloned: two bitmaps
/// describing the same window would drift apart silently.
#[derive(Debug, PartialEq, Eq)]
pub struct PageBitmap {
    /// Packed page states, `PAGES_PER_WORD` per word.
    words: Box<[u32]>,
    /// Number of pages tracked. The last word may have unused tail bits.
    page_count: usize,
}

impl PageBitmap {
    /// Creates a bitmap with every page free.
    #[must_use]
    pub fn new(page_count: usize) -> Self {
        Self {
            words: vec![0; page_count.div_ceil(PAGES_PER_WORD)].into_boxed_slice(),
            page_count,
        }
    }

    /// Number of pages tracked.
    #[inline]
    #[must_use]
    pub const fn page_count(&self) -> usize {
        self.page_count
    }

    /// Returns the state of `page`.
    ///
    /// # Panics
    ///
    /// Panics if `page` is outside the bitmap.
    #[inline]
    #[must_use]
    pub fn get(&self, page: usize) -> PageStatus {
        assert!(page < self.page_count, "page {page} out of range");
        let shift = (page % PAGES_PER_WORD) * BITS_PER_PAGE;
        PageStatus::from_bits((self.words[page / PAGES_PER_WORD] >> shift) & PAGE_MASK)
    }

    /// Sets the state of `page`.
    ///
    /// # Panics
    ///
    /// Panics if `page` is outside the bitmap.
    #[inline]
    pub fn set(&mut self, page: usize, status: PageStatus) {
        assert!(page < self.page_count, "page {page} out of range");
        let shift = (page % PAGES_PER_WORD) * BITS_PER_PAGE;
        let word = &mut self.words[page / PAGES_PER_WORD];
        *word = (*word & !(PAGE_MASK << shift)) | (status.bits() << shift);
    }

    /// Iterates over the state of every page in order.
    pub fn iter(&self) -> impl Iterator<Item = PageStatus> + '_ {
        (0..self.page_count).map(|page| self.get(page))
    }

    /// Marks every page free.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Searches for `length` free pages at offsets that are multiples of
    /// `stride`, starting at `cursor` and never past `max_offset`.
    ///
    /// A probe blocked by a taken page `j` jumps straight to the first
    /// stride position after `j`: every position in between would still
    /// have `j` inside its window.
    ///
    /// On success the cursor moves one stride past the found offset. On
    /// failure it is left on the first stride position past `max_offset`.
    /// The caller guarantees `max_offset + length <= page_count`.
    pub fn find_free_run(
        &self,
        length: usize,
        stride: usize,
        max_offset: usize,
        cursor: &mut usize,
    ) -> Option<usize> {
        debug_assert!(length > 0);
        debug_assert!(stride > 0);
        debug_assert!(max_offset + length <= self.page_count);

        let mut offset = cursor.next_multiple_of(stride);
        while offset <= max_offset {
            match self.last_taken_in(offset, length) {
                None => {
                    *cursor = offset + stride;
                    return Some(offset);
                }
                Some(blocker) => offset = (blocker / stride + 1) * stride,
            }
        }

        *cursor = offset;
        None
    }

    /// Highest taken page in `[offset, offset + length)`.
    fn last_taken_in(&self, offset: usize, length: usize) -> Option<usize> {
        (offset..offset + length)
            .rev()
            .find(|&page| self.get(page).is_taken())
    }

    /// Marks `[offset, offset + length)` as one allocation.
    pub fn fill_run(&mut self, offset: usize, length: usize) {
        debug_assert!(length > 0);
        let last = offset + length - 1;
        for page in offset..last {
            self.set(page, PageStatus::Occupied);
        }
        self.set(last, PageStatus::AllocationEnd);
    }

    /// Frees the allocation starting at `offset`, up to and including its
    /// `AllocationEnd` page. Returns the number of pages freed.
    pub fn erase_run(&mut self, offset: usize) -> usize {
        let mut page = offset;
        loop {
            let status = self.get(page);
            debug_assert!(status.is_taken(), "page {page} is already free");
            self.set(page, PageStatus::Free);
            page += 1;
            if status != PageStatus::Occupied || page >= self.page_count {
                break;
            }
        }
        page - offset
    }

    /// Length of the allocation starting at `offset`, found by walking to
    /// its `AllocationEnd`. `None` if `offset` is free or the run is
    /// unterminated.
    #[must_use]
    pub fn run_len(&self, offset: usize) -> Option<usize> {
        for page in offset..self.page_count {
            match self.get(page) {
                PageStatus::Free => return None,
                PageStatus::Occupied => {}
                PageStatus::AllocationEnd => return Some(page - offset + 1),
            }
        }
        None
    }

    /// Grows or shrinks the allocation at `offset` to `new_length` pages
    /// without moving it.
    ///
    /// Growing needs the extra trailing pages to be free and inside the
    /// bitmap. On failure nothing is modified.
    pub fn try_resize_run(&mut self, offset: usize, new_length: usize) -> bool {
        let Some(length) = self.run_len(offset) else {
            return false;
        };
        if new_length == 0 || offset + new_length > self.page_count {
            return false;
        }

        match new_length.cmp(&length) {
            Ordering::Equal => true,
            Ordering::Greater => {
                let tail = offset + length..offset + new_length;
                if tail.clone().any(|page| self.get(page).is_taken()) {
                    return false;
                }
                self.set(offset + length - 1, PageStatus::Occupied);
                self.fill_run(tail.start, tail.len());
                true
            }
            Ordering::Less => {
                for page in offset + new_length..offset + length {
                    self.set(page, PageStatus::Free);
                }
                self.set(offset + new_length - 1, PageStatus::AllocationEnd);
                true
            }
        }
    }
}

//! # Address Arithmetic
//!
//! The allocators never dereference an address. All they need is the
//! distance between two addresses and the ability to step forward, so any
//! ordered handle type can back a page window: plain integers, device
//! offsets, or packed slot indices.
//!
//! Arithmetic is exact. A window whose end does not fit the address type is
//! rejected when the allocator is built, so stepping inside a window never
//! overflows.

use std::fmt::Debug;

/// An opaque, ordered address inside a page window.
///
/// `a.distance_from(b)` plays the role of `a - b` and `a.offset_by(n)` the
/// role of `a + n`, both measured in address units.
pub trait Address: Copy + Eq + Ord + Debug {
    /// Returns `self - origin`. Only called with `origin <= self`.
    ///
    /// # Panics
    ///
    /// Panics if the distance does not fit in `usize`.
    fn distance_from(self, origin: Self) -> usize;

    /// Returns `self + units`, or `None` if that is not representable.
    #[must_use]
    fn checked_offset_by(self, units: usize) -> Option<Self>;

    /// Returns `self + units`.
    ///
    /// # Panics
    ///
    /// Panics if `self + units` is not representable.
    #[must_use]
    fn offset_by(self, units: usize) -> Self {
        match self.checked_offset_by(units) {
            Some(address) => address,
            None => panic!("address {self:?} + {units} overflows"),
        }
    }
}

impl Address for usize {
    #[inline]
    fn distance_from(self, origin: Self) -> usize {
        self - origin
    }

    #[inline]
    fn checked_offset_by(self, units: usize) -> Option<Self> {
        self.checked_add(units)
    }
}

macro_rules! impl_address_for_int {
    ($($ty:ty),* $(,)?) => {$(
        impl Address for $ty {
            #[inline]
            fn distance_from(self, origin: Self) -> usize {
                match usize::try_from(self - origin) {
                    Ok(distance) => distance,
                    Err(_) => panic!("distance from {origin} to {self} exceeds usize"),
                }
            }

            #[inline]
            fn checked_offset_by(self, units: usize) -> Option<Self> {
                <$ty>::try_from(units)
                    .ok()
                    .and_then(|units| self.checked_add(units))
            }
        }
    )*};
}

impl_address_for_int!(u32, u64);

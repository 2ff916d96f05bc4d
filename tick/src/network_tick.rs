//! Wrapping network tick with an in-band validity bit.

use std::fmt;

const INDEX_BITS: u32 = 31;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const HALF_RANGE: u32 = 1 << (INDEX_BITS - 1);

/// A simulation tick as exchanged on the wire.
///
/// The low bit marks validity and the upper 31 bits hold a wrapping tick
/// index. Raw `0` is the invalid tick. Ordering is only meaningful through
/// [`is_newer_than`](Self::is_newer_than) and [`ticks_since`](Self::ticks_since):
/// raw integer comparison breaks at wraparound.
///
/// Arithmetic on an invalid tick is a programming error and asserts in debug builds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NetworkTick(u32);

impl NetworkTick {
    /// The invalid tick ("no tick yet").
    pub const INVALID: Self = Self(0);

    /// Creates a valid tick from a 31-bit index; higher bits are discarded.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(((index & INDEX_MASK) << 1) | 1)
    }

    /// Reinterprets a raw wire value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 & 1 == 1
    }

    /// Returns the 31-bit tick index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 >> 1
    }

    /// Returns the tick `n` ticks later, wrapping.
    #[must_use]
    pub fn add(self, n: u32) -> Self {
        debug_assert!(self.is_valid(), "arithmetic on invalid network tick");
        Self::new(self.index().wrapping_add(n))
    }

    /// Returns the tick `n` ticks earlier, wrapping.
    #[must_use]
    pub fn subtract(self, n: u32) -> Self {
        debug_assert!(self.is_valid(), "arithmetic on invalid network tick");
        Self::new(self.index().wrapping_sub(n))
    }

    /// Moves by a signed number of ticks.
    #[must_use]
    pub fn offset(self, n: i32) -> Self {
        if n >= 0 {
            self.add(n.unsigned_abs())
        } else {
            self.subtract(n.unsigned_abs())
        }
    }

    pub fn increment(&mut self) {
        *self = self.add(1);
    }

    pub fn decrement(&mut self) {
        *self = self.subtract(1);
    }

    /// Signed distance `self - older` in ticks.
    ///
    /// Positive when `self` is newer. Exactly half the index range apart is
    /// reported as negative from both sides; use [`is_newer_than`](Self::is_newer_than)
    /// for a strict order.
    #[must_use]
    pub fn ticks_since(self, older: Self) -> i32 {
        debug_assert!(
            self.is_valid() && older.is_valid(),
            "arithmetic on invalid network tick"
        );
        let diff = self.index().wrapping_sub(older.index()) & INDEX_MASK;
        ((diff << 1) as i32) >> 1
    }

    /// Wrap-aware "strictly newer than".
    ///
    /// For any two distinct valid ticks exactly one is newer than the other.
    /// At exactly half the range apart the larger raw index wins.
    #[must_use]
    pub fn is_newer_than(self, other: Self) -> bool {
        debug_assert!(
            self.is_valid() && other.is_valid(),
            "comparison of invalid network tick"
        );
        let diff = self.index().wrapping_sub(other.index()) & INDEX_MASK;
        if diff == 0 {
            return false;
        }
        match diff.cmp(&HALF_RANGE) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => self.index() > other.index(),
        }
    }

    /// Returns whichever tick is newer, treating invalid as oldest.
    #[must_use]
    pub fn newest(self, other: Self) -> Self {
        match (self.is_valid(), other.is_valid()) {
            (false, _) => other,
            (true, false) => self,
            (true, true) if other.is_newer_than(self) => other,
            (true, true) => self,
        }
    }
}

impl fmt::Debug for NetworkTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "NetworkTick({})", self.index())
        } else {
            write!(f, "NetworkTick(invalid)")
        }
    }
}

impl fmt::Display for NetworkTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.index())
        } else {
            write!(f, "-")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_is_zero() {
        assert_eq!(NetworkTick::INVALID.raw(), 0);
        assert!(!NetworkTick::INVALID.is_valid());
        assert!(NetworkTick::new(0).is_valid());
        assert_eq!(NetworkTick::new(0).raw(), 1);
    }

    #[test]
    fn add_and_subtract_wrap() {
        let last = NetworkTick::new(INDEX_MASK);
        let first = last.add(1);
        assert_eq!(first.index(), 0);
        assert_eq!(first.subtract(1), last);
        assert!(first.is_newer_than(last));
        assert_eq!(first.ticks_since(last), 1);
        assert_eq!(last.ticks_since(first), -1);
    }

    #[test]
    fn increment_decrement() {
        let mut tick = NetworkTick::new(10);
        tick.increment();
        assert_eq!(tick.index(), 11);
        tick.decrement();
        tick.decrement();
        assert_eq!(tick.index(), 9);
        assert_eq!(tick.offset(-9).index(), 0);
        assert_eq!(tick.offset(3).index(), 12);
    }

    #[test]
    fn half_range_is_antisymmetric() {
        let a = NetworkTick::new(5);
        let b = NetworkTick::new(5 + HALF_RANGE);
        assert_ne!(a.is_newer_than(b), b.is_newer_than(a));
        assert!(b.is_newer_than(a));
    }

    #[test]
    fn equal_ticks_are_not_newer() {
        let a = NetworkTick::new(77);
        assert!(!a.is_newer_than(a));
        assert_eq!(a.ticks_since(a), 0);
    }

    #[test]
    fn newest_prefers_valid() {
        let a = NetworkTick::new(3);
        assert_eq!(NetworkTick::INVALID.newest(a), a);
        assert_eq!(a.newest(NetworkTick::INVALID), a);
        assert_eq!(a.newest(a.add(2)), a.add(2));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invalid network tick")]
    fn invalid_arithmetic_asserts() {
        let _ = NetworkTick::INVALID.add(1);
    }
}

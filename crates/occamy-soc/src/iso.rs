// SPDX-License-Identifier: AGPL-3.0-only

//! Isolation signal groups.
//!
//! Each cluster's AXI ports sit behind isolation cells. While a group is
//! isolated, nothing the cluster drives on it reaches the rest of the SoC
//! (and vice versa). Bring-up releases the groups after the clock is running
//! so the cluster can raise interrupts and answer handshakes.
//!
//! ```text
//! bit  group        direction
//! ───  ───────────  ──────────────────────────
//!  0   narrow_in    SoC → cluster, 64-bit AXI
//!  1   narrow_out   cluster → SoC, 64-bit AXI
//!  2   wide_in      SoC → cluster, 512-bit AXI
//!  3   wide_out     cluster → SoC, 512-bit AXI
//! ```

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

/// Narrow (64-bit) inbound port.
pub const NARROW_IN: u32 = 1 << 0;
/// Narrow (64-bit) outbound port.
pub const NARROW_OUT: u32 = 1 << 1;
/// Wide (512-bit) inbound port.
pub const WIDE_IN: u32 = 1 << 2;
/// Wide (512-bit) outbound port.
pub const WIDE_OUT: u32 = 1 << 3;

/// A set of isolation groups.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IsolationMask(u32);

impl IsolationMask {
    /// No groups.
    pub const NONE: Self = Self(0);
    /// Every group (`narrow_in | narrow_out | wide_in | wide_out`).
    pub const ALL: Self = Self(NARROW_IN | NARROW_OUT | WIDE_IN | WIDE_OUT);
    /// Narrow ports only: enough for interrupts and register handshakes.
    pub const NARROW: Self = Self(NARROW_IN | NARROW_OUT);

    /// Build a mask from raw bits; bits outside the four groups are dropped.
    #[must_use]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Raw register bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if no group is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every group in `other` is also in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for IsolationMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for IsolationMask {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for IsolationMask {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0 & Self::ALL.0)
    }
}

impl fmt::Debug for IsolationMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (NARROW_IN, "narrow_in"),
            (NARROW_OUT, "narrow_out"),
            (WIDE_IN, "wide_in"),
            (WIDE_OUT, "wide_out"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|(_, name)| *name)
            .collect();
        write!(f, "IsolationMask({})", set.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_covers_every_group() {
        assert_eq!(IsolationMask::ALL.bits(), 0xF);
        assert!(IsolationMask::ALL.contains(IsolationMask::NARROW));
        assert!(!IsolationMask::NARROW.contains(IsolationMask::ALL));
    }

    #[test]
    fn complement_stays_in_range() {
        assert_eq!((!IsolationMask::NARROW).bits(), WIDE_IN | WIDE_OUT);
        assert_eq!(!IsolationMask::ALL, IsolationMask::NONE);
    }

    #[test]
    fn truncates_unknown_bits() {
        assert_eq!(IsolationMask::from_bits_truncate(0xFF), IsolationMask::ALL);
    }
}

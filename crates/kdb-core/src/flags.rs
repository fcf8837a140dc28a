//! Change descriptor flag bits.
//!
//! The bit values are part of the wire format and must match the
//! instrumented writer exactly.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Flag bitfield carried by a valid change descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChdescFlags(pub u32);

impl ChdescFlags {
    /// No flags set.
    pub const EMPTY: Self = Self(0);
    /// Marked for inspection.
    pub const MARKED: Self = Self(0x01);
    /// The change is not currently applied to its block's data.
    pub const ROLLBACK: Self = Self(0x02);
    /// The change has reached the disk.
    pub const WRITTEN: Self = Self(0x04);
    /// The change is being freed.
    pub const FREEING: Self = Self(0x08);
    /// The change covers file data rather than metadata.
    pub const DATA: Self = Self(0x10);
    /// A bit change that was turned into a no-op.
    pub const BIT_NOOP: Self = Self(0x20);
    /// The change overlaps another change on the same block.
    pub const OVERLAP: Self = Self(0x40);
    /// Afters may be written safely.
    pub const SAFE_AFTER: Self = Self(0x80);
    /// The change is in flight to the disk.
    pub const INFLIGHT: Self = Self(0x100);
    /// The change is waiting on the disk buffer.
    pub const DBWAIT: Self = Self(0x8000);

    const NAMED: [(Self, &'static str); 10] = [
        (Self::MARKED, "MARKED"),
        (Self::ROLLBACK, "ROLLBACK"),
        (Self::WRITTEN, "WRITTEN"),
        (Self::FREEING, "FREEING"),
        (Self::DATA, "DATA"),
        (Self::BIT_NOOP, "BIT_NOOP"),
        (Self::OVERLAP, "OVERLAP"),
        (Self::SAFE_AFTER, "SAFE_AFTER"),
        (Self::INFLIGHT, "INFLIGHT"),
        (Self::DBWAIT, "DBWAIT"),
    ];

    /// Raw bit value.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Set every bit of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear every bit of `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Whether no bits are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Names of the set flags in bit order.
    ///
    /// Bits without a name are reported once as their hex remainder.
    pub fn names(self) -> Vec<String> {
        let mut names = Vec::new();
        let mut rest = self.0;
        for (flag, name) in Self::NAMED {
            if self.contains(flag) {
                names.push(name.to_string());
                rest &= !flag.0;
            }
        }
        if rest != 0 {
            names.push(format!("{rest:#x}"));
        }
        names
    }
}

impl BitOr for ChdescFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChdescFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl From<u32> for ChdescFlags {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl fmt::Display for ChdescFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "0");
        }
        write!(f, "{}", self.names().join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn wire_values() {
        assert_eq!(ChdescFlags::MARKED.bits(), 0x01);
        assert_eq!(ChdescFlags::ROLLBACK.bits(), 0x02);
        assert_eq!(ChdescFlags::WRITTEN.bits(), 0x04);
        assert_eq!(ChdescFlags::FREEING.bits(), 0x08);
        assert_eq!(ChdescFlags::DATA.bits(), 0x10);
        assert_eq!(ChdescFlags::BIT_NOOP.bits(), 0x20);
        assert_eq!(ChdescFlags::OVERLAP.bits(), 0x40);
        assert_eq!(ChdescFlags::SAFE_AFTER.bits(), 0x80);
        assert_eq!(ChdescFlags::INFLIGHT.bits(), 0x100);
        assert_eq!(ChdescFlags::DBWAIT.bits(), 0x8000);
    }

    #[test]
    fn display_names_in_bit_order() {
        let flags = ChdescFlags::WRITTEN | ChdescFlags::MARKED;
        assert_eq!(flags.to_string(), "MARKED | WRITTEN");
        assert_eq!(ChdescFlags(0x1_0001).to_string(), "MARKED | 0x10000");
        assert_eq!(ChdescFlags::EMPTY.to_string(), "0");
    }

    proptest! {
        #[test]
        fn insert_then_remove_clears(base in any::<u32>(), bits in any::<u32>()) {
            let mut flags = ChdescFlags(base);
            flags.insert(ChdescFlags(bits));
            prop_assert!(flags.contains(ChdescFlags(bits)));
            flags.remove(ChdescFlags(bits));
            prop_assert!(!flags.intersects(ChdescFlags(bits)));
            prop_assert_eq!(flags.bits(), base & !bits);
        }
    }
}

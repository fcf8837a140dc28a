//! Opaque 32-bit identities recorded by the instrumented component.
//!
//! None of these are pointers in this process. They are keys under which
//! the traced system identified its objects, and `0` always means "none".
//! All of them print as zero-padded hexadecimal (`0x0000beef`).

use std::fmt;

macro_rules! address_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// The null identity.
            pub const NULL: Self = Self(0);

            /// Whether this is the null identity.
            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#010x}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(v: u32) -> Self {
                Self(v)
            }
        }

        impl From<$name> for u32 {
            fn from(v: $name) -> u32 {
                v.0
            }
        }
    };
}

address_id! {
    /// Identifies a change descriptor (one pending write).
    ///
    /// Addresses are reused by the traced allocator, so the same value
    /// may name several distinct descriptors over the life of a trace.
    ChdescAddr
}

address_id! {
    /// Identifies a cached block descriptor.
    BlockAddr
}

address_id! {
    /// Identifies the module (block device) that owns a change.
    OwnerAddr
}

address_id! {
    /// Identifies the data descriptor backing a block.
    DdescAddr
}

address_id! {
    /// An external slot holding a weak reference to a change descriptor.
    Location
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_zero_padded_hex() {
        assert_eq!(ChdescAddr(0xbeef).to_string(), "0x0000beef");
        assert_eq!(BlockAddr(0).to_string(), "0x00000000");
        assert_eq!(OwnerAddr(0xdeadbeef).to_string(), "0xdeadbeef");
    }

    #[test]
    fn null_identity() {
        assert!(ChdescAddr::NULL.is_null());
        assert!(!Location(4).is_null());
        assert_eq!(DdescAddr::from(7u32), DdescAddr(7));
        assert_eq!(u32::from(BlockAddr(9)), 9);
    }
}

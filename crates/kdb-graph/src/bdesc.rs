//! Block descriptors.

use std::fmt;

use kdb_core::{BlockAddr, DdescAddr, RefCounts};

/// A cached disk block, kept for display correlation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bdesc {
    /// The traced address.
    pub address: BlockAddr,
    /// Data descriptor holding the block contents.
    pub ddesc: DdescAddr,
    /// Block number on the device.
    pub number: u32,
    /// Number of device blocks spanned.
    pub count: u32,
    /// Reference counts from the last retain-family opcode.
    pub counts: RefCounts,
}

impl Bdesc {
    /// A freshly allocated block.
    pub fn new(address: BlockAddr, ddesc: DdescAddr, number: u32, count: u32) -> Self {
        Self {
            address,
            ddesc,
            number,
            count,
            counts: RefCounts::default(),
        }
    }
}

impl fmt::Display for Bdesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[bdesc {}: ddesc {}, number {}, count {}, refs {}/{}/{}]",
            self.address,
            self.ddesc,
            self.number,
            self.count,
            self.counts.ref_count,
            self.counts.ar_count,
            self.counts.dd_count
        )
    }
}

/// Display number announced for a block by an info opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockNumber {
    /// Block number on the device.
    pub number: u32,
    /// Number of device blocks spanned.
    pub count: u32,
}

//! Change descriptors.
//!
//! A [`Chdesc`] lives in the state's arena for the whole replay and is
//! addressed by its [`ChdescId`] slot. Edges, free-list links and the
//! free head are slot handles, so they stay resolvable after the
//! descriptor is destroyed or while it is still a dangling placeholder.
//!
//! Field access is guarded by validity: block, owner, flags and the
//! dependency collections are defined only for NOOP, BIT and BYTE
//! descriptors, and the payload fields only for the matching type.

use std::fmt;

use indexmap::IndexSet;

use kdb_core::{BlockAddr, ChdescAddr, ChdescFlags, Location, OwnerAddr, StateError};

use crate::registry::Registry;

/// Arena slot of a change descriptor.
///
/// Slots are never reused within one state, so a re-created address gets
/// a new slot and is distinguishable from its predecessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChdescId(pub(crate) u32);

impl ChdescId {
    /// The slot index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ChdescId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type tag and type-specific payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChdescType {
    /// Ordering-only descriptor with no data.
    Noop,
    /// Flips the bits of `xor` in the 32-bit word at `offset`.
    Bit {
        /// Word offset within the block.
        offset: u16,
        /// Bits to flip.
        xor: u32,
    },
    /// Overwrites `length` bytes at `offset`.
    Byte {
        /// Byte offset within the block.
        offset: u16,
        /// Bytes written.
        length: u16,
    },
    /// Terminal state after a destroy opcode.
    Destroy,
    /// Placeholder for an address referenced before its creation.
    Dangling,
}

impl ChdescType {
    /// Whether the descriptor is NOOP, BIT or BYTE.
    pub fn is_valid(self) -> bool {
        matches!(self, Self::Noop | Self::Bit { .. } | Self::Byte { .. })
    }

    /// Upper-case type name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Noop => "NOOP",
            Self::Bit { .. } => "BIT",
            Self::Byte { .. } => "BYTE",
            Self::Destroy => "DESTROY",
            Self::Dangling => "DANGLING",
        }
    }
}

impl fmt::Display for ChdescType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One pending write and its ordering edges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chdesc {
    address: ChdescAddr,
    slot: ChdescId,
    kind: ChdescType,
    block: BlockAddr,
    owner: OwnerAddr,
    flags: ChdescFlags,
    befores: Registry<ChdescAddr, ChdescId>,
    afters: Registry<ChdescAddr, ChdescId>,
    locations: IndexSet<Location>,
    free_prev: Option<ChdescId>,
    free_next: Option<ChdescId>,
    labels: Registry<String, ()>,
    created_at: usize,
}

impl Chdesc {
    /// A placeholder for a forward reference.
    pub(crate) fn dangling(address: ChdescAddr, slot: ChdescId, created_at: usize) -> Self {
        Self {
            address,
            slot,
            kind: ChdescType::Dangling,
            block: BlockAddr::NULL,
            owner: OwnerAddr::NULL,
            flags: ChdescFlags::EMPTY,
            befores: Registry::new(),
            afters: Registry::new(),
            locations: IndexSet::new(),
            free_prev: None,
            free_next: None,
            labels: Registry::new(),
            created_at,
        }
    }

    /// A freshly created descriptor. BIT and BYTE start rolled back.
    pub(crate) fn created(
        address: ChdescAddr,
        slot: ChdescId,
        kind: ChdescType,
        block: BlockAddr,
        owner: OwnerAddr,
        created_at: usize,
    ) -> Self {
        let mut chdesc = Self::dangling(address, slot, created_at);
        chdesc.fill(kind, block, owner, created_at);
        chdesc
    }

    /// Turn a placeholder into a real descriptor, keeping its edges.
    pub(crate) fn upgrade(
        &mut self,
        kind: ChdescType,
        block: BlockAddr,
        owner: OwnerAddr,
        created_at: usize,
    ) -> Result<(), StateError> {
        if self.kind != ChdescType::Dangling {
            return Err(StateError::DuplicateChdesc { addr: self.address });
        }
        self.fill(kind, block, owner, created_at);
        Ok(())
    }

    fn fill(&mut self, kind: ChdescType, block: BlockAddr, owner: OwnerAddr, created_at: usize) {
        self.kind = kind;
        self.block = block;
        self.owner = owner;
        self.created_at = created_at;
        if matches!(kind, ChdescType::Bit { .. } | ChdescType::Byte { .. }) {
            self.flags.insert(ChdescFlags::ROLLBACK);
        }
    }

    // ── Unguarded accessors ────────────────────────────────────

    /// The traced address.
    pub fn address(&self) -> ChdescAddr {
        self.address
    }

    /// Arena slot.
    pub fn slot(&self) -> ChdescId {
        self.slot
    }

    /// Current type and payload.
    pub fn kind(&self) -> ChdescType {
        self.kind
    }

    /// Whether the descriptor is NOOP, BIT or BYTE.
    pub fn is_valid(&self) -> bool {
        self.kind.is_valid()
    }

    /// Whether this is an unresolved forward reference.
    pub fn is_dangling(&self) -> bool {
        self.kind == ChdescType::Dangling
    }

    /// Annotation labels with their reference counts.
    pub fn labels(&self) -> &Registry<String, ()> {
        &self.labels
    }

    /// Applied-opcode count at creation (or materialization).
    pub fn created_at(&self) -> usize {
        self.created_at
    }

    // ── Guarded accessors ──────────────────────────────────────

    pub(crate) fn check(&self, action: &'static str) -> Result<(), StateError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(StateError::InvalidChdesc {
                addr: self.address,
                action,
            })
        }
    }

    fn wrong_type(&self, field: &'static str) -> StateError {
        StateError::WrongType {
            addr: self.address,
            field,
            kind: self.kind.name(),
        }
    }

    /// The block written.
    pub fn block(&self) -> Result<BlockAddr, StateError> {
        self.check("query block of")?;
        Ok(self.block)
    }

    /// The owning module.
    pub fn owner(&self) -> Result<OwnerAddr, StateError> {
        self.check("query owner of")?;
        Ok(self.owner)
    }

    /// Current flags.
    pub fn flags(&self) -> Result<ChdescFlags, StateError> {
        self.check("query flags of")?;
        Ok(self.flags)
    }

    /// Offset of a BIT or BYTE descriptor.
    pub fn offset(&self) -> Result<u16, StateError> {
        match self.kind {
            ChdescType::Bit { offset, .. } | ChdescType::Byte { offset, .. } => Ok(offset),
            _ => Err(self.wrong_type("offset")),
        }
    }

    /// Bits flipped by a BIT descriptor.
    pub fn xor(&self) -> Result<u32, StateError> {
        match self.kind {
            ChdescType::Bit { xor, .. } => Ok(xor),
            _ => Err(self.wrong_type("xor")),
        }
    }

    /// Bytes written by a BYTE descriptor.
    pub fn length(&self) -> Result<u16, StateError> {
        match self.kind {
            ChdescType::Byte { length, .. } => Ok(length),
            _ => Err(self.wrong_type("length")),
        }
    }

    /// Descriptors that must reach the disk first.
    pub fn befores(&self) -> Result<&Registry<ChdescAddr, ChdescId>, StateError> {
        self.check("query befores of")?;
        Ok(&self.befores)
    }

    /// Descriptors that wait for this one.
    pub fn afters(&self) -> Result<&Registry<ChdescAddr, ChdescId>, StateError> {
        self.check("query afters of")?;
        Ok(&self.afters)
    }

    /// External slots holding a weak reference.
    pub fn locations(&self) -> Result<&IndexSet<Location>, StateError> {
        self.check("query weak references to")?;
        Ok(&self.locations)
    }

    /// Previous descriptor on the free list.
    pub fn free_prev(&self) -> Result<Option<ChdescId>, StateError> {
        self.check("query free_prev of")?;
        Ok(self.free_prev)
    }

    /// Next descriptor on the free list.
    pub fn free_next(&self) -> Result<Option<ChdescId>, StateError> {
        self.check("query free_next of")?;
        Ok(self.free_next)
    }

    // ── Mutators ───────────────────────────────────────────────

    pub(crate) fn set_block(&mut self, block: BlockAddr) -> Result<(), StateError> {
        self.check("set block of")?;
        self.block = block;
        Ok(())
    }

    pub(crate) fn set_owner(&mut self, owner: OwnerAddr) -> Result<(), StateError> {
        self.check("set owner of")?;
        self.owner = owner;
        Ok(())
    }

    pub(crate) fn set_flags(&mut self, flags: ChdescFlags) -> Result<(), StateError> {
        self.check("set flags of")?;
        self.flags.insert(flags);
        Ok(())
    }

    pub(crate) fn clear_flags(&mut self, flags: ChdescFlags) -> Result<(), StateError> {
        self.check("clear flags of")?;
        self.flags.remove(flags);
        Ok(())
    }

    pub(crate) fn set_offset(&mut self, value: u16) -> Result<(), StateError> {
        self.check("set offset of")?;
        if let ChdescType::Bit { offset, .. } | ChdescType::Byte { offset, .. } = &mut self.kind {
            *offset = value;
            return Ok(());
        }
        Err(self.wrong_type("offset"))
    }

    pub(crate) fn set_xor(&mut self, value: u32) -> Result<(), StateError> {
        self.check("set xor of")?;
        if let ChdescType::Bit { xor, .. } = &mut self.kind {
            *xor = value;
            return Ok(());
        }
        Err(self.wrong_type("xor"))
    }

    pub(crate) fn set_length(&mut self, value: u16) -> Result<(), StateError> {
        self.check("set length of")?;
        if let ChdescType::Byte { length, .. } = &mut self.kind {
            *length = value;
            return Ok(());
        }
        Err(self.wrong_type("length"))
    }

    /// Replace the type and payload wholesale.
    pub(crate) fn convert(&mut self, kind: ChdescType) -> Result<(), StateError> {
        self.check("change type of")?;
        debug_assert!(kind.is_valid());
        self.kind = kind;
        Ok(())
    }

    pub(crate) fn destroy(&mut self) -> Result<(), StateError> {
        self.check("destroy")?;
        self.kind = ChdescType::Destroy;
        Ok(())
    }

    pub(crate) fn set_free_prev(&mut self, prev: Option<ChdescId>) -> Result<(), StateError> {
        self.check("set free_prev of")?;
        self.free_prev = prev;
        Ok(())
    }

    pub(crate) fn set_free_next(&mut self, next: Option<ChdescId>) -> Result<(), StateError> {
        self.check("set free_next of")?;
        self.free_next = next;
        Ok(())
    }

    pub(crate) fn add_before(&mut self, addr: ChdescAddr, id: ChdescId) -> Result<(), StateError> {
        self.check("add before to")?;
        self.befores.add(addr, id);
        Ok(())
    }

    pub(crate) fn add_after(&mut self, addr: ChdescAddr, id: ChdescId) -> Result<(), StateError> {
        self.check("add after to")?;
        self.afters.add(addr, id);
        Ok(())
    }

    pub(crate) fn rem_before(&mut self, addr: ChdescAddr) -> Result<(), StateError> {
        self.check("remove before from")?;
        self.befores.remove(&addr);
        Ok(())
    }

    pub(crate) fn rem_after(&mut self, addr: ChdescAddr) -> Result<(), StateError> {
        self.check("remove after from")?;
        self.afters.remove(&addr);
        Ok(())
    }

    pub(crate) fn weak_retain(&mut self, location: Location) -> Result<(), StateError> {
        self.check("weak retain")?;
        self.locations.insert(location);
        Ok(())
    }

    pub(crate) fn weak_forget(&mut self, location: Location) -> Result<(), StateError> {
        self.check("weak forget")?;
        self.locations.shift_remove(&location);
        Ok(())
    }

    pub(crate) fn add_label(&mut self, label: &str) {
        self.labels.add(label.to_owned(), ());
    }
}

impl fmt::Display for Chdesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[chdesc {}: ", self.address)?;
        if self.is_valid() {
            write!(f, "block {}, owner {}, ", self.block, self.owner)?;
        }
        match self.kind {
            ChdescType::Bit { offset, xor } => write!(f, "BIT, offset {offset}, xor {xor:#010x}")?,
            ChdescType::Byte { offset, length } => {
                write!(f, "BYTE, offset {offset}, length {length}")?
            }
            ChdescType::Destroy => f.write_str("DESTROYED")?,
            other => f.write_str(other.name())?,
        }
        if self.is_valid() && !self.flags.is_empty() {
            write!(f, ", flags {}", self.flags)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(addr: u32) -> Chdesc {
        Chdesc::created(
            ChdescAddr(addr),
            ChdescId(0),
            ChdescType::Noop,
            BlockAddr(0xb0),
            OwnerAddr(0x99),
            0,
        )
    }

    #[test]
    fn bit_and_byte_start_rolled_back() {
        let bit = Chdesc::created(
            ChdescAddr(1),
            ChdescId(0),
            ChdescType::Bit { offset: 4, xor: 0xff },
            BlockAddr(2),
            OwnerAddr(3),
            0,
        );
        assert!(bit.flags().unwrap().contains(ChdescFlags::ROLLBACK));
        assert!(!noop(1).flags().unwrap().contains(ChdescFlags::ROLLBACK));
    }

    #[test]
    fn dangling_rejects_queries() {
        let c = Chdesc::dangling(ChdescAddr(0x20), ChdescId(1), 0);
        assert!(c.is_dangling());
        assert_eq!(
            c.block(),
            Err(StateError::InvalidChdesc {
                addr: ChdescAddr(0x20),
                action: "query block of"
            })
        );
        assert!(c.befores().is_err());
    }

    #[test]
    fn upgrade_only_from_dangling() {
        let mut c = Chdesc::dangling(ChdescAddr(0x20), ChdescId(1), 0);
        c.upgrade(ChdescType::Noop, BlockAddr(1), OwnerAddr(2), 5)
            .unwrap();
        assert_eq!(c.owner(), Ok(OwnerAddr(2)));
        assert_eq!(c.created_at(), 5);
        assert_eq!(
            c.upgrade(ChdescType::Noop, BlockAddr(1), OwnerAddr(2), 6),
            Err(StateError::DuplicateChdesc {
                addr: ChdescAddr(0x20)
            })
        );
    }

    #[test]
    fn destroy_is_terminal() {
        let mut c = noop(0x10);
        c.destroy().unwrap();
        assert_eq!(c.kind(), ChdescType::Destroy);
        assert!(c.destroy().is_err());
        assert!(c.convert(ChdescType::Noop).is_err());
        assert!(c.set_flags(ChdescFlags::MARKED).is_err());
        assert!(c.add_before(ChdescAddr(1), ChdescId(2)).is_err());
        assert_eq!(c.kind(), ChdescType::Destroy);
    }

    #[test]
    fn payload_setters_check_type() {
        let mut c = noop(0x10);
        assert_eq!(
            c.set_xor(1),
            Err(StateError::WrongType {
                addr: ChdescAddr(0x10),
                field: "xor",
                kind: "NOOP"
            })
        );
        c.convert(ChdescType::Byte { offset: 0, length: 8 }).unwrap();
        c.set_offset(12).unwrap();
        c.set_length(4).unwrap();
        assert!(c.set_xor(1).is_err());
        assert_eq!(c.offset(), Ok(12));
        assert_eq!(c.length(), Ok(4));
    }

    #[test]
    fn edges_are_counted() {
        let mut c = noop(0x10);
        c.add_before(ChdescAddr(0x20), ChdescId(1)).unwrap();
        c.add_before(ChdescAddr(0x20), ChdescId(1)).unwrap();
        c.rem_before(ChdescAddr(0x20)).unwrap();
        assert_eq!(c.befores().unwrap().count(&ChdescAddr(0x20)), 1);
        c.rem_before(ChdescAddr(0x20)).unwrap();
        assert!(c.befores().unwrap().is_empty());
    }

    #[test]
    fn display_matches_type() {
        let c = Chdesc::created(
            ChdescAddr(0x10),
            ChdescId(0),
            ChdescType::Bit { offset: 3, xor: 0x80 },
            BlockAddr(0xb0),
            OwnerAddr(0x99),
            0,
        );
        assert_eq!(
            c.to_string(),
            "[chdesc 0x00000010: block 0x000000b0, owner 0x00000099, \
             BIT, offset 3, xor 0x00000080, flags ROLLBACK]"
        );
        let d = Chdesc::dangling(ChdescAddr(0x20), ChdescId(1), 0);
        assert_eq!(d.to_string(), "[chdesc 0x00000020: DANGLING]");
    }
}

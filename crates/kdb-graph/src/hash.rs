//! State fingerprinting.
//!
//! Uses FNV-1a for fast, deterministic hashing of a reconstructed state.
//! Fingerprints are not cryptographically secure; they let replay tests
//! and seek checks compare two states in O(1) after hashing.

use kdb_core::ChdescAddr;

use crate::chdesc::{Chdesc, ChdescId, ChdescType};
use crate::state::SystemState;

/// FNV-1a offset basis for 64-bit.
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
/// FNV-1a prime for 64-bit.
const FNV_PRIME: u64 = 0x00000100000001B3;

#[derive(Clone, Copy)]
struct Fnv(u64);

impl Fnv {
    #[inline]
    fn byte(self, b: u8) -> Self {
        Self((self.0 ^ u64::from(b)).wrapping_mul(FNV_PRIME))
    }

    #[inline]
    fn bytes(self, bytes: &[u8]) -> Self {
        bytes.iter().fold(self, |h, &b| h.byte(b))
    }

    #[inline]
    fn u32(self, v: u32) -> Self {
        self.bytes(&v.to_le_bytes())
    }

    #[inline]
    fn u64(self, v: u64) -> Self {
        self.bytes(&v.to_le_bytes())
    }

    /// Length-prefixed so adjacent strings cannot alias.
    fn str(self, s: &str) -> Self {
        self.u64(s.len() as u64).bytes(s.as_bytes())
    }

    fn slot(self, id: Option<ChdescId>) -> Self {
        match id {
            Some(id) => self.byte(1).u32(id.0),
            None => self.byte(0),
        }
    }
}

fn hash_type(h: Fnv, kind: ChdescType) -> Fnv {
    match kind {
        ChdescType::Noop => h.byte(0),
        ChdescType::Bit { offset, xor } => h.byte(1).u32(u32::from(offset)).u32(xor),
        ChdescType::Byte { offset, length } => {
            h.byte(2).u32(u32::from(offset)).u32(u32::from(length))
        }
        ChdescType::Destroy => h.byte(3),
        ChdescType::Dangling => h.byte(4),
    }
}

fn hash_edges<'a>(
    mut h: Fnv,
    edges: impl Iterator<Item = (&'a ChdescAddr, &'a ChdescId, usize)>,
) -> Fnv {
    for (addr, id, count) in edges {
        h = h.u32(addr.0).u32(id.0).u64(count as u64);
    }
    h.byte(0xff)
}

fn hash_chdesc(mut h: Fnv, c: &Chdesc) -> Fnv {
    h = h.u32(c.address().0).u32(c.slot().0).u64(c.created_at() as u64);
    h = hash_type(h, c.kind());
    if let (Ok(block), Ok(owner), Ok(flags)) = (c.block(), c.owner(), c.flags()) {
        h = h.u32(block.0).u32(owner.0).u32(flags.bits());
    }
    if let Ok(befores) = c.befores() {
        h = hash_edges(h, befores.entries());
    }
    if let Ok(afters) = c.afters() {
        h = hash_edges(h, afters.entries());
    }
    if let Ok(locations) = c.locations() {
        for loc in locations {
            h = h.u32(loc.0);
        }
        h = h.byte(0xff);
    }
    if let (Ok(prev), Ok(next)) = (c.free_prev(), c.free_next()) {
        h = h.slot(prev).slot(next);
    }
    for (label, _, count) in c.labels().entries() {
        h = h.str(label).u64(count as u64);
    }
    h
}

/// Hash every observable part of `state`, in iteration order.
///
/// Arena slots outside the registry (destroyed descriptors) are hashed
/// too, since edges may still point at them.
pub fn state_fingerprint(state: &SystemState) -> u64 {
    let mut h = Fnv(FNV_OFFSET).u64(state.applied() as u64);

    for (addr, id, count) in state.registry().entries() {
        h = h.u32(addr.0).u32(id.0).u64(count as u64);
    }
    h = h.byte(0xff);

    for slot in 0..state.slot_count() {
        if let Some(c) = state.chdesc(ChdescId(slot as u32)) {
            h = hash_chdesc(h, c);
        }
    }

    for b in state.bdescs() {
        h = h
            .u32(b.address.0)
            .u32(b.ddesc.0)
            .u32(b.number)
            .u32(b.count)
            .u32(b.counts.ref_count)
            .u32(b.counts.ar_count)
            .u32(b.counts.dd_count);
    }
    h = h.byte(0xff);

    h = h.slot(state.free_head().map(Chdesc::slot));
    for (owner, name) in state.bd_names() {
        h = h.u32(owner.0).str(name);
    }
    for (block, n) in state.block_numbers() {
        h = h.u32(block.0).u32(n.number).u32(n.count);
    }
    h.u32(state.ar_depth()).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdb_core::{ChdescFlags, OpcodeKind, OwnerAddr};

    fn create(addr: u32) -> OpcodeKind {
        OpcodeKind::ChdescCreateNoop {
            chdesc: ChdescAddr(addr),
            owner: OwnerAddr(1),
        }
    }

    #[test]
    fn empty_state_is_stable() {
        let a = SystemState::new();
        let b = SystemState::new();
        assert_eq!(state_fingerprint(&a), state_fingerprint(&b));
        assert_ne!(state_fingerprint(&a), FNV_OFFSET);
    }

    #[test]
    fn flags_change_fingerprint() {
        let mut a = SystemState::new();
        a.apply(&create(0x10)).unwrap();
        let before = state_fingerprint(&a);
        a.apply(&OpcodeKind::ChdescSetFlags {
            chdesc: ChdescAddr(0x10),
            flags: ChdescFlags::MARKED,
        })
        .unwrap();
        assert_ne!(state_fingerprint(&a), before);
    }

    #[test]
    fn creation_order_matters() {
        let mut a = SystemState::new();
        a.apply(&create(1)).unwrap();
        a.apply(&create(2)).unwrap();
        let mut b = SystemState::new();
        b.apply(&create(2)).unwrap();
        b.apply(&create(1)).unwrap();
        assert_ne!(state_fingerprint(&a), state_fingerprint(&b));
    }
}

//! Reconstructed system state and the opcode state machine.
//!
//! [`SystemState::apply`] is an exhaustive match over every
//! [`OpcodeKind`]. Opcodes whose primary chdesc is unknown are ignored;
//! opcodes that reach a destroyed or dangling descriptor fail with a
//! [`StateError`]. Edge targets, free-list links and the free head that
//! name an unknown address materialize a DANGLING placeholder in the
//! registry, which a later create upgrades in place.

use indexmap::IndexMap;
use tracing::{debug, trace};

use kdb_core::{BlockAddr, ChdescAddr, ChdescFlags, OpcodeKind, OwnerAddr, StateError};

use crate::bdesc::{Bdesc, BlockNumber};
use crate::chdesc::{Chdesc, ChdescId, ChdescType};
use crate::hash;
use crate::registry::Registry;

/// Which side of a dependency an edge opcode adds.
#[derive(Clone, Copy)]
enum Edge {
    Before,
    After,
}

/// Which free-list pointer an opcode sets.
#[derive(Clone, Copy)]
enum FreeLink {
    Prev,
    Next,
}

/// Full snapshot of the traced component at one point in the trace.
///
/// Exclusively owns every descriptor. Edges between descriptors are
/// [`ChdescId`] slots into the arena and never extend lifetime.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemState {
    arena: Vec<Chdesc>,
    chdescs: Registry<ChdescAddr, ChdescId>,
    bdescs: IndexMap<BlockAddr, Bdesc>,
    free_head: Option<ChdescId>,
    bd_names: IndexMap<OwnerAddr, String>,
    block_numbers: IndexMap<BlockAddr, BlockNumber>,
    ar_depth: u32,
    applied: usize,
}

impl SystemState {
    /// The empty initial state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one decoded opcode.
    ///
    /// Every check runs before the first mutation, so on error the state
    /// is unchanged and the opcode does not count as applied.
    pub fn apply(&mut self, op: &OpcodeKind) -> Result<(), StateError> {
        self.apply_kind(op)?;
        self.applied += 1;
        Ok(())
    }

    fn apply_kind(&mut self, op: &OpcodeKind) -> Result<(), StateError> {
        match op {
            // ── Info ──────────────────────────────────────────
            OpcodeKind::InfoMark { .. } => Ok(()),
            OpcodeKind::InfoBdName { bd, name } => {
                self.bd_names.insert(*bd, name.clone());
                Ok(())
            }
            OpcodeKind::InfoBdescNumber {
                block,
                number,
                count,
            } => {
                self.block_numbers.insert(
                    *block,
                    BlockNumber {
                        number: *number,
                        count: *count,
                    },
                );
                Ok(())
            }
            OpcodeKind::InfoChdescLabel { chdesc, label } => {
                if let Some(id) = self.live(*chdesc, op) {
                    self.arena[id.index()].add_label(label);
                }
                Ok(())
            }

            // ── Bdesc ─────────────────────────────────────────
            OpcodeKind::BdescAlloc {
                block,
                ddesc,
                number,
                count,
            }
            | OpcodeKind::BdescAllocWrap {
                block,
                ddesc,
                number,
                count,
            } => {
                if self.bdescs.contains_key(block) {
                    return Err(StateError::DuplicateBdesc { addr: *block });
                }
                self.bdescs
                    .insert(*block, Bdesc::new(*block, *ddesc, *number, *count));
                Ok(())
            }
            OpcodeKind::BdescRetain {
                block,
                ddesc,
                counts,
            }
            | OpcodeKind::BdescRelease {
                block,
                ddesc,
                counts,
            }
            | OpcodeKind::BdescAutorelease {
                block,
                ddesc,
                counts,
            }
            | OpcodeKind::BdescArReset {
                block,
                ddesc,
                counts,
            } => {
                match self.bdescs.get_mut(block) {
                    Some(bdesc) => {
                        bdesc.ddesc = *ddesc;
                        bdesc.counts = *counts;
                    }
                    None => debug!(opcode = op.name(), bdesc = %block, "unknown bdesc"),
                }
                Ok(())
            }
            OpcodeKind::BdescDestroy { block, .. } => {
                if self.bdescs.shift_remove(block).is_none() {
                    debug!(bdesc = %block, "destroy of unknown bdesc");
                }
                Ok(())
            }
            OpcodeKind::BdescFreeDdesc { .. } => Ok(()),
            OpcodeKind::BdescArPoolPush { depth } | OpcodeKind::BdescArPoolPop { depth } => {
                self.ar_depth = *depth;
                Ok(())
            }

            // ── Chdesc alter ──────────────────────────────────
            OpcodeKind::ChdescCreateNoop { chdesc, owner } => {
                self.create(*chdesc, ChdescType::Noop, BlockAddr::NULL, *owner)
            }
            OpcodeKind::ChdescCreateBit {
                chdesc,
                block,
                owner,
                offset,
                xor,
            } => self.create(
                *chdesc,
                ChdescType::Bit {
                    offset: *offset,
                    xor: *xor,
                },
                *block,
                *owner,
            ),
            OpcodeKind::ChdescCreateByte {
                chdesc,
                block,
                owner,
                offset,
                length,
            } => self.create(
                *chdesc,
                ChdescType::Byte {
                    offset: *offset,
                    length: *length,
                },
                *block,
                *owner,
            ),
            OpcodeKind::ChdescConvertNoop { chdesc } => {
                self.with_live(*chdesc, op, |c| c.convert(ChdescType::Noop))
            }
            OpcodeKind::ChdescConvertBit {
                chdesc,
                offset,
                xor,
            } => self.with_live(*chdesc, op, |c| {
                c.convert(ChdescType::Bit {
                    offset: *offset,
                    xor: *xor,
                })
            }),
            OpcodeKind::ChdescConvertByte {
                chdesc,
                offset,
                length,
            } => self.with_live(*chdesc, op, |c| {
                c.convert(ChdescType::Byte {
                    offset: *offset,
                    length: *length,
                })
            }),
            OpcodeKind::ChdescRewriteByte { .. } => Ok(()),
            OpcodeKind::ChdescApply { chdesc } => {
                self.with_live(*chdesc, op, |c| c.clear_flags(ChdescFlags::ROLLBACK))
            }
            OpcodeKind::ChdescRollback { chdesc } => {
                self.with_live(*chdesc, op, |c| c.set_flags(ChdescFlags::ROLLBACK))
            }
            OpcodeKind::ChdescSetFlags { chdesc, flags } => {
                self.with_live(*chdesc, op, |c| c.set_flags(*flags))
            }
            OpcodeKind::ChdescClearFlags { chdesc, flags } => {
                self.with_live(*chdesc, op, |c| c.clear_flags(*flags))
            }
            OpcodeKind::ChdescDestroy { chdesc } => {
                if let Some(id) = self.live(*chdesc, op) {
                    self.arena[id.index()].destroy()?;
                    self.chdescs.remove_all(chdesc);
                }
                Ok(())
            }
            OpcodeKind::ChdescAddBefore { source, target } => {
                self.add_edge(*source, *target, op, Edge::Before)
            }
            OpcodeKind::ChdescAddAfter { source, target } => {
                self.add_edge(*source, *target, op, Edge::After)
            }
            OpcodeKind::ChdescRemBefore { source, target } => {
                self.with_live(*source, op, |c| c.rem_before(*target))
            }
            OpcodeKind::ChdescRemAfter { source, target } => {
                self.with_live(*source, op, |c| c.rem_after(*target))
            }
            OpcodeKind::ChdescWeakRetain { chdesc, location } => {
                self.with_live(*chdesc, op, |c| c.weak_retain(*location))
            }
            OpcodeKind::ChdescWeakForget { chdesc, location } => {
                self.with_live(*chdesc, op, |c| c.weak_forget(*location))
            }
            OpcodeKind::ChdescSetOffset { chdesc, offset } => {
                self.with_live(*chdesc, op, |c| c.set_offset(*offset))
            }
            OpcodeKind::ChdescSetXor { chdesc, xor } => {
                self.with_live(*chdesc, op, |c| c.set_xor(*xor))
            }
            OpcodeKind::ChdescSetLength { chdesc, length } => {
                self.with_live(*chdesc, op, |c| c.set_length(*length))
            }
            OpcodeKind::ChdescSetBlock { chdesc, block } => {
                self.with_live(*chdesc, op, |c| c.set_block(*block))
            }
            OpcodeKind::ChdescSetOwner { chdesc, owner } => {
                self.with_live(*chdesc, op, |c| c.set_owner(*owner))
            }
            OpcodeKind::ChdescSetFreePrev { chdesc, free_prev } => {
                self.set_free_link(*chdesc, *free_prev, op, FreeLink::Prev)
            }
            OpcodeKind::ChdescSetFreeNext { chdesc, free_next } => {
                self.set_free_link(*chdesc, *free_next, op, FreeLink::Next)
            }
            OpcodeKind::ChdescSetFreeHead { chdesc } => {
                self.free_head = if chdesc.is_null() {
                    None
                } else {
                    Some(self.materialize(*chdesc))
                };
                Ok(())
            }

            // ── Chdesc info ───────────────────────────────────
            OpcodeKind::ChdescSatisfy { .. }
            | OpcodeKind::ChdescWeakCollect { .. }
            | OpcodeKind::ChdescOverlapAttach { .. }
            | OpcodeKind::ChdescOverlapMultiattach { .. } => Ok(()),
        }
    }

    // ── Apply helpers ──────────────────────────────────────────

    /// Registry slot for `addr`, logging when the opcode is ignored.
    fn live(&self, addr: ChdescAddr, op: &OpcodeKind) -> Option<ChdescId> {
        let id = self.chdescs.get(&addr).copied();
        if id.is_none() {
            debug!(opcode = op.name(), chdesc = %addr, "ignoring opcode for unknown chdesc");
        }
        id
    }

    fn with_live<F>(&mut self, addr: ChdescAddr, op: &OpcodeKind, f: F) -> Result<(), StateError>
    where
        F: FnOnce(&mut Chdesc) -> Result<(), StateError>,
    {
        match self.live(addr, op) {
            Some(id) => f(&mut self.arena[id.index()]),
            None => Ok(()),
        }
    }

    fn next_slot(&self) -> ChdescId {
        ChdescId(self.arena.len() as u32)
    }

    /// The slot registered for `addr`, creating a DANGLING placeholder
    /// if there is none.
    fn materialize(&mut self, addr: ChdescAddr) -> ChdescId {
        if let Some(&id) = self.chdescs.get(&addr) {
            return id;
        }
        let id = self.next_slot();
        self.arena.push(Chdesc::dangling(addr, id, self.applied));
        self.chdescs.add(addr, id);
        trace!(chdesc = %addr, slot = id.index(), "materialized dangling placeholder");
        id
    }

    fn create(
        &mut self,
        addr: ChdescAddr,
        kind: ChdescType,
        block: BlockAddr,
        owner: OwnerAddr,
    ) -> Result<(), StateError> {
        if let Some(&id) = self.chdescs.get(&addr) {
            return self.arena[id.index()].upgrade(kind, block, owner, self.applied);
        }
        let id = self.next_slot();
        self.arena
            .push(Chdesc::created(addr, id, kind, block, owner, self.applied));
        if self.chdescs.add_strict(addr, id).is_err() {
            return Err(StateError::DuplicateChdesc { addr });
        }
        Ok(())
    }

    fn add_edge(
        &mut self,
        source: ChdescAddr,
        target: ChdescAddr,
        op: &OpcodeKind,
        edge: Edge,
    ) -> Result<(), StateError> {
        let Some(src) = self.live(source, op) else {
            return Ok(());
        };
        let action = match edge {
            Edge::Before => "add before to",
            Edge::After => "add after to",
        };
        self.arena[src.index()].check(action)?;
        let dst = self.materialize(target);
        let chdesc = &mut self.arena[src.index()];
        match edge {
            Edge::Before => chdesc.add_before(target, dst),
            Edge::After => chdesc.add_after(target, dst),
        }
    }

    fn set_free_link(
        &mut self,
        addr: ChdescAddr,
        link: ChdescAddr,
        op: &OpcodeKind,
        which: FreeLink,
    ) -> Result<(), StateError> {
        let Some(id) = self.live(addr, op) else {
            return Ok(());
        };
        let action = match which {
            FreeLink::Prev => "set free_prev of",
            FreeLink::Next => "set free_next of",
        };
        self.arena[id.index()].check(action)?;
        let target = if link.is_null() {
            None
        } else {
            Some(self.materialize(link))
        };
        let chdesc = &mut self.arena[id.index()];
        match which {
            FreeLink::Prev => chdesc.set_free_prev(target),
            FreeLink::Next => chdesc.set_free_next(target),
        }
    }

    // ── Queries ────────────────────────────────────────────────

    /// Number of opcodes applied to this state.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Number of registered chdesc addresses, placeholders included.
    pub fn chdesc_count(&self) -> usize {
        self.chdescs.len()
    }

    /// The chdesc registry, mapping addresses to arena slots.
    pub fn registry(&self) -> &Registry<ChdescAddr, ChdescId> {
        &self.chdescs
    }

    /// Registered chdescs in registry iteration order, once per reference.
    pub fn chdescs(&self) -> impl Iterator<Item = &Chdesc> + '_ {
        self.chdescs.values().map(|id| &self.arena[id.index()])
    }

    /// The chdesc registered at `addr`.
    pub fn lookup(&self, addr: ChdescAddr) -> Option<&Chdesc> {
        self.chdescs.get(&addr).map(|id| &self.arena[id.index()])
    }

    /// The chdesc in arena slot `id`, registered or not.
    pub fn chdesc(&self, id: ChdescId) -> Option<&Chdesc> {
        self.arena.get(id.index())
    }

    /// Number of arena slots ever allocated.
    pub fn slot_count(&self) -> usize {
        self.arena.len()
    }

    /// Registered placeholders that no create opcode has resolved.
    pub fn dangling(&self) -> Vec<ChdescAddr> {
        self.chdescs()
            .filter(|c| c.is_dangling())
            .map(Chdesc::address)
            .collect()
    }

    /// Head of the free list.
    pub fn free_head(&self) -> Option<&Chdesc> {
        self.free_head.and_then(|id| self.chdesc(id))
    }

    /// The block descriptor at `addr`.
    pub fn bdesc(&self, addr: BlockAddr) -> Option<&Bdesc> {
        self.bdescs.get(&addr)
    }

    /// Live block descriptors in allocation order.
    pub fn bdescs(&self) -> impl Iterator<Item = &Bdesc> + '_ {
        self.bdescs.values()
    }

    /// Number of live block descriptors.
    pub fn bdesc_count(&self) -> usize {
        self.bdescs.len()
    }

    /// Device name announced for an owner.
    pub fn bd_name(&self, owner: OwnerAddr) -> Option<&str> {
        self.bd_names.get(&owner).map(String::as_str)
    }

    /// Announced device names.
    pub fn bd_names(&self) -> impl Iterator<Item = (OwnerAddr, &str)> + '_ {
        self.bd_names.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Display number announced for a block.
    pub fn block_number(&self, block: BlockAddr) -> Option<BlockNumber> {
        self.block_numbers.get(&block).copied()
    }

    /// Announced block numbers.
    pub fn block_numbers(&self) -> impl Iterator<Item = (BlockAddr, BlockNumber)> + '_ {
        self.block_numbers.iter().map(|(k, v)| (*k, *v))
    }

    /// Last reported autorelease pool depth.
    pub fn ar_depth(&self) -> u32 {
        self.ar_depth
    }

    /// Order-sensitive FNV-1a digest of the whole state.
    pub fn fingerprint(&self) -> u64 {
        hash::state_fingerprint(self)
    }
}

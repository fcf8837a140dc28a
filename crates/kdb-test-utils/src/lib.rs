//! Test utilities for kdb development.
//!
//! [`TraceBuilder`] assembles an opcode log and encodes it through the
//! real [`TraceWriter`], so decoder and replay tests exercise the exact
//! wire framing. [`fixtures`] holds canned scenarios and [`strategy`]
//! holds proptest strategies for randomized logs.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod strategy;

use std::sync::Arc;

use kdb_core::{
    BlockAddr, CallStack, ChdescAddr, ChdescFlags, DdescAddr, Location, Opcode, OpcodeKind,
    OwnerAddr, Provenance,
};
use kdb_wire::{
    ByteOrder, EncodeError, SchemaRegistry, TraceWriter, OPCODE_REVISION, TOOL_REVISION,
};

/// Fluent builder for opcode logs and their encoded bytes.
///
/// Provenance and call stack set with [`at`](TraceBuilder::at) and
/// [`with_stack`](TraceBuilder::with_stack) apply to every opcode pushed
/// afterwards.
#[derive(Clone, Debug)]
pub struct TraceBuilder {
    ops: Vec<Opcode>,
    provenance: Provenance,
    stack: Option<CallStack>,
    order: ByteOrder,
    tool_rev: u32,
    opcode_rev: u32,
}

impl Default for TraceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            provenance: Provenance::default(),
            stack: None,
            order: ByteOrder::Big,
            tool_rev: TOOL_REVISION,
            opcode_rev: OPCODE_REVISION,
        }
    }

    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    pub fn revisions(mut self, tool_rev: u32, opcode_rev: u32) -> Self {
        self.tool_rev = tool_rev;
        self.opcode_rev = opcode_rev;
        self
    }

    /// Source location recorded for subsequent opcodes.
    pub fn at(mut self, file: &str, line: u32, function: &str) -> Self {
        self.provenance = Provenance {
            file: Arc::from(file),
            line,
            function: Arc::from(function),
        };
        self
    }

    /// Call stack recorded for subsequent opcodes; empty clears it.
    pub fn with_stack(mut self, frames: &[u32]) -> Self {
        self.stack = if frames.is_empty() {
            None
        } else {
            Some(CallStack::new(Arc::from(frames)))
        };
        self
    }

    pub fn push(mut self, kind: OpcodeKind) -> Self {
        self.ops.push(Opcode {
            kind,
            provenance: self.provenance.clone(),
            stack: self.stack.clone(),
        });
        self
    }

    pub fn extend(self, kinds: impl IntoIterator<Item = OpcodeKind>) -> Self {
        kinds.into_iter().fold(self, Self::push)
    }

    // ── Info ───────────────────────────────────────────────────

    pub fn mark(self, module: u16) -> Self {
        self.push(OpcodeKind::InfoMark { module })
    }

    pub fn bd_name(self, bd: u32, name: &str) -> Self {
        self.push(OpcodeKind::InfoBdName {
            bd: OwnerAddr(bd),
            name: name.to_owned(),
        })
    }

    pub fn bdesc_number(self, block: u32, number: u32, count: u32) -> Self {
        self.push(OpcodeKind::InfoBdescNumber {
            block: BlockAddr(block),
            number,
            count,
        })
    }

    pub fn label(self, chdesc: u32, label: &str) -> Self {
        self.push(OpcodeKind::InfoChdescLabel {
            chdesc: ChdescAddr(chdesc),
            label: label.to_owned(),
        })
    }

    // ── Bdesc ──────────────────────────────────────────────────

    pub fn alloc(self, block: u32, ddesc: u32, number: u32, count: u32) -> Self {
        self.push(OpcodeKind::BdescAlloc {
            block: BlockAddr(block),
            ddesc: DdescAddr(ddesc),
            number,
            count,
        })
    }

    pub fn bdesc_destroy(self, block: u32, ddesc: u32) -> Self {
        self.push(OpcodeKind::BdescDestroy {
            block: BlockAddr(block),
            ddesc: DdescAddr(ddesc),
        })
    }

    // ── Chdesc ─────────────────────────────────────────────────

    pub fn create_noop(self, chdesc: u32, owner: u32) -> Self {
        self.push(OpcodeKind::ChdescCreateNoop {
            chdesc: ChdescAddr(chdesc),
            owner: OwnerAddr(owner),
        })
    }

    pub fn create_bit(self, chdesc: u32, block: u32, owner: u32, offset: u16, xor: u32) -> Self {
        self.push(OpcodeKind::ChdescCreateBit {
            chdesc: ChdescAddr(chdesc),
            block: BlockAddr(block),
            owner: OwnerAddr(owner),
            offset,
            xor,
        })
    }

    pub fn create_byte(
        self,
        chdesc: u32,
        block: u32,
        owner: u32,
        offset: u16,
        length: u16,
    ) -> Self {
        self.push(OpcodeKind::ChdescCreateByte {
            chdesc: ChdescAddr(chdesc),
            block: BlockAddr(block),
            owner: OwnerAddr(owner),
            offset,
            length,
        })
    }

    pub fn apply(self, chdesc: u32) -> Self {
        self.push(OpcodeKind::ChdescApply {
            chdesc: ChdescAddr(chdesc),
        })
    }

    pub fn rollback(self, chdesc: u32) -> Self {
        self.push(OpcodeKind::ChdescRollback {
            chdesc: ChdescAddr(chdesc),
        })
    }

    pub fn set_flags(self, chdesc: u32, flags: ChdescFlags) -> Self {
        self.push(OpcodeKind::ChdescSetFlags {
            chdesc: ChdescAddr(chdesc),
            flags,
        })
    }

    pub fn clear_flags(self, chdesc: u32, flags: ChdescFlags) -> Self {
        self.push(OpcodeKind::ChdescClearFlags {
            chdesc: ChdescAddr(chdesc),
            flags,
        })
    }

    pub fn set_block(self, chdesc: u32, block: u32) -> Self {
        self.push(OpcodeKind::ChdescSetBlock {
            chdesc: ChdescAddr(chdesc),
            block: BlockAddr(block),
        })
    }

    pub fn destroy(self, chdesc: u32) -> Self {
        self.push(OpcodeKind::ChdescDestroy {
            chdesc: ChdescAddr(chdesc),
        })
    }

    pub fn add_before(self, source: u32, target: u32) -> Self {
        self.push(OpcodeKind::ChdescAddBefore {
            source: ChdescAddr(source),
            target: ChdescAddr(target),
        })
    }

    pub fn add_after(self, source: u32, target: u32) -> Self {
        self.push(OpcodeKind::ChdescAddAfter {
            source: ChdescAddr(source),
            target: ChdescAddr(target),
        })
    }

    pub fn rem_before(self, source: u32, target: u32) -> Self {
        self.push(OpcodeKind::ChdescRemBefore {
            source: ChdescAddr(source),
            target: ChdescAddr(target),
        })
    }

    pub fn weak_retain(self, chdesc: u32, location: u32) -> Self {
        self.push(OpcodeKind::ChdescWeakRetain {
            chdesc: ChdescAddr(chdesc),
            location: Location(location),
        })
    }

    pub fn set_free_prev(self, chdesc: u32, free_prev: u32) -> Self {
        self.push(OpcodeKind::ChdescSetFreePrev {
            chdesc: ChdescAddr(chdesc),
            free_prev: ChdescAddr(free_prev),
        })
    }

    pub fn set_free_next(self, chdesc: u32, free_next: u32) -> Self {
        self.push(OpcodeKind::ChdescSetFreeNext {
            chdesc: ChdescAddr(chdesc),
            free_next: ChdescAddr(free_next),
        })
    }

    pub fn set_free_head(self, chdesc: u32) -> Self {
        self.push(OpcodeKind::ChdescSetFreeHead {
            chdesc: ChdescAddr(chdesc),
        })
    }

    // ── Output ─────────────────────────────────────────────────

    pub fn opcodes(&self) -> &[Opcode] {
        &self.ops
    }

    pub fn kinds(&self) -> Vec<OpcodeKind> {
        self.ops.iter().map(|op| op.kind.clone()).collect()
    }

    /// Encode the header and every opcode.
    pub fn try_build(&self) -> Result<Vec<u8>, EncodeError> {
        let mut writer = TraceWriter::with_format(
            Vec::new(),
            self.tool_rev,
            self.opcode_rev,
            self.order,
            SchemaRegistry::standard(),
        )?;
        for op in &self.ops {
            writer.write_opcode(op)?;
        }
        writer.into_inner()
    }

    /// Encode the trace, panicking on opcodes the writer rejects.
    pub fn build(&self) -> Vec<u8> {
        self.try_build().expect("fixture trace must encode")
    }
}

//! Decoded opcode values.
//!
//! An [`Opcode`] is one immutable record of a traced mutation: its typed
//! fields ([`OpcodeKind`]), the call site that emitted it, and the call
//! stack captured at that point. The set of kinds is closed so that the
//! replay logic can match every one of them exhaustively.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::flags::ChdescFlags;
use crate::id::{BlockAddr, ChdescAddr, DdescAddr, Location, OwnerAddr};

/// Module identifiers used on the wire.
pub mod module {
    /// Annotation opcodes (marks, names, labels).
    pub const INFO: u16 = 1;
    /// Block descriptor lifecycle.
    pub const BDESC: u16 = 100;
    /// Change descriptor mutation.
    pub const CHDESC_ALTER: u16 = 200;
    /// Change descriptor informational events.
    pub const CHDESC_INFO: u16 = 300;
}

/// Opcode identifiers used on the wire, unique across modules.
#[allow(missing_docs)]
pub mod ids {
    pub const INFO_MARK: u16 = 0;
    pub const INFO_BD_NAME: u16 = 1;
    pub const INFO_BDESC_NUMBER: u16 = 2;
    pub const INFO_CHDESC_LABEL: u16 = 3;

    pub const BDESC_ALLOC: u16 = 101;
    pub const BDESC_ALLOC_WRAP: u16 = 102;
    pub const BDESC_RETAIN: u16 = 103;
    pub const BDESC_RELEASE: u16 = 104;
    pub const BDESC_DESTROY: u16 = 105;
    pub const BDESC_FREE_DDESC: u16 = 106;
    pub const BDESC_AUTORELEASE: u16 = 107;
    pub const BDESC_AR_RESET: u16 = 108;
    pub const BDESC_AR_POOL_PUSH: u16 = 109;
    pub const BDESC_AR_POOL_POP: u16 = 110;

    pub const CHDESC_CREATE_NOOP: u16 = 201;
    pub const CHDESC_CREATE_BIT: u16 = 202;
    pub const CHDESC_CREATE_BYTE: u16 = 203;
    pub const CHDESC_CONVERT_NOOP: u16 = 204;
    pub const CHDESC_CONVERT_BIT: u16 = 205;
    pub const CHDESC_CONVERT_BYTE: u16 = 206;
    pub const CHDESC_REWRITE_BYTE: u16 = 207;
    pub const CHDESC_APPLY: u16 = 208;
    pub const CHDESC_ROLLBACK: u16 = 209;
    pub const CHDESC_SET_FLAGS: u16 = 210;
    pub const CHDESC_CLEAR_FLAGS: u16 = 211;
    pub const CHDESC_DESTROY: u16 = 212;
    pub const CHDESC_ADD_BEFORE: u16 = 213;
    pub const CHDESC_ADD_AFTER: u16 = 214;
    pub const CHDESC_REM_BEFORE: u16 = 215;
    pub const CHDESC_REM_AFTER: u16 = 216;
    pub const CHDESC_WEAK_RETAIN: u16 = 217;
    pub const CHDESC_WEAK_FORGET: u16 = 218;
    pub const CHDESC_SET_OFFSET: u16 = 219;
    pub const CHDESC_SET_XOR: u16 = 220;
    pub const CHDESC_SET_LENGTH: u16 = 221;
    pub const CHDESC_SET_BLOCK: u16 = 222;
    pub const CHDESC_SET_OWNER: u16 = 223;
    pub const CHDESC_SET_FREE_PREV: u16 = 224;
    pub const CHDESC_SET_FREE_NEXT: u16 = 225;
    pub const CHDESC_SET_FREE_HEAD: u16 = 226;

    pub const CHDESC_SATISFY: u16 = 301;
    pub const CHDESC_WEAK_COLLECT: u16 = 302;
    pub const CHDESC_OVERLAP_ATTACH: u16 = 303;
    pub const CHDESC_OVERLAP_MULTIATTACH: u16 = 304;
}

/// Reference counts reported by the block retain/release family.
///
/// The traced component logs the counts after the operation, so applying
/// one of these opcodes simply records them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RefCounts {
    /// Strong references.
    pub ref_count: u32,
    /// Pending autoreleases.
    pub ar_count: u32,
    /// References on the data descriptor.
    pub dd_count: u32,
}

/// A decoded field value, used for display and for encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldValue<'a> {
    /// An opaque address, printed in hex.
    Addr(u32),
    /// A plain integer, printed in decimal.
    Int(u32),
    /// A flag set, printed by name.
    Flags(ChdescFlags),
    /// A string.
    Str(&'a str),
}

impl FieldValue<'_> {
    /// The numeric value, or `None` for strings.
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Self::Addr(v) | Self::Int(v) => Some(v),
            Self::Flags(f) => Some(f.bits()),
            Self::Str(_) => None,
        }
    }
}

impl fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Addr(v) => write!(f, "{v:#010x}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Flags(flags) => write!(f, "{:#x} ({flags})", flags.bits()),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Ordered `(parameter name, value)` list of an opcode.
pub type Fields<'a> = SmallVec<[(&'static str, FieldValue<'a>); 5]>;

/// Every opcode kind the debugger understands, with its decoded fields.
///
/// Field names follow the wire parameter names of each opcode.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OpcodeKind {
    InfoMark { module: u16 },
    InfoBdName { bd: OwnerAddr, name: String },
    InfoBdescNumber { block: BlockAddr, number: u32, count: u32 },
    InfoChdescLabel { chdesc: ChdescAddr, label: String },

    BdescAlloc { block: BlockAddr, ddesc: DdescAddr, number: u32, count: u32 },
    BdescAllocWrap { block: BlockAddr, ddesc: DdescAddr, number: u32, count: u32 },
    BdescRetain { block: BlockAddr, ddesc: DdescAddr, counts: RefCounts },
    BdescRelease { block: BlockAddr, ddesc: DdescAddr, counts: RefCounts },
    BdescDestroy { block: BlockAddr, ddesc: DdescAddr },
    BdescFreeDdesc { block: BlockAddr, ddesc: DdescAddr },
    BdescAutorelease { block: BlockAddr, ddesc: DdescAddr, counts: RefCounts },
    BdescArReset { block: BlockAddr, ddesc: DdescAddr, counts: RefCounts },
    BdescArPoolPush { depth: u32 },
    BdescArPoolPop { depth: u32 },

    ChdescCreateNoop { chdesc: ChdescAddr, owner: OwnerAddr },
    ChdescCreateBit { chdesc: ChdescAddr, block: BlockAddr, owner: OwnerAddr, offset: u16, xor: u32 },
    ChdescCreateByte { chdesc: ChdescAddr, block: BlockAddr, owner: OwnerAddr, offset: u16, length: u16 },
    ChdescConvertNoop { chdesc: ChdescAddr },
    ChdescConvertBit { chdesc: ChdescAddr, offset: u16, xor: u32 },
    ChdescConvertByte { chdesc: ChdescAddr, offset: u16, length: u16 },
    ChdescRewriteByte { chdesc: ChdescAddr },
    ChdescApply { chdesc: ChdescAddr },
    ChdescRollback { chdesc: ChdescAddr },
    ChdescSetFlags { chdesc: ChdescAddr, flags: ChdescFlags },
    ChdescClearFlags { chdesc: ChdescAddr, flags: ChdescFlags },
    ChdescDestroy { chdesc: ChdescAddr },
    ChdescAddBefore { source: ChdescAddr, target: ChdescAddr },
    ChdescAddAfter { source: ChdescAddr, target: ChdescAddr },
    ChdescRemBefore { source: ChdescAddr, target: ChdescAddr },
    ChdescRemAfter { source: ChdescAddr, target: ChdescAddr },
    ChdescWeakRetain { chdesc: ChdescAddr, location: Location },
    ChdescWeakForget { chdesc: ChdescAddr, location: Location },
    ChdescSetOffset { chdesc: ChdescAddr, offset: u16 },
    ChdescSetXor { chdesc: ChdescAddr, xor: u32 },
    ChdescSetLength { chdesc: ChdescAddr, length: u16 },
    ChdescSetBlock { chdesc: ChdescAddr, block: BlockAddr },
    ChdescSetOwner { chdesc: ChdescAddr, owner: OwnerAddr },
    ChdescSetFreePrev { chdesc: ChdescAddr, free_prev: ChdescAddr },
    ChdescSetFreeNext { chdesc: ChdescAddr, free_next: ChdescAddr },
    ChdescSetFreeHead { chdesc: ChdescAddr },

    ChdescSatisfy { chdesc: ChdescAddr },
    ChdescWeakCollect { chdesc: ChdescAddr },
    ChdescOverlapAttach { recent: ChdescAddr, original: ChdescAddr },
    ChdescOverlapMultiattach { chdesc: ChdescAddr, block: BlockAddr },
}

impl OpcodeKind {
    /// The wire module id.
    pub fn module(&self) -> u16 {
        use OpcodeKind::*;
        match self {
            InfoMark { .. } | InfoBdName { .. } | InfoBdescNumber { .. } | InfoChdescLabel { .. } => {
                module::INFO
            }
            BdescAlloc { .. }
            | BdescAllocWrap { .. }
            | BdescRetain { .. }
            | BdescRelease { .. }
            | BdescDestroy { .. }
            | BdescFreeDdesc { .. }
            | BdescAutorelease { .. }
            | BdescArReset { .. }
            | BdescArPoolPush { .. }
            | BdescArPoolPop { .. } => module::BDESC,
            ChdescSatisfy { .. }
            | ChdescWeakCollect { .. }
            | ChdescOverlapAttach { .. }
            | ChdescOverlapMultiattach { .. } => module::CHDESC_INFO,
            _ => module::CHDESC_ALTER,
        }
    }

    /// The wire opcode id and diagnostic name.
    pub fn id(&self) -> (u16, &'static str) {
        use OpcodeKind::*;
        match self {
            InfoMark { .. } => (ids::INFO_MARK, "KDB_INFO_MARK"),
            InfoBdName { .. } => (ids::INFO_BD_NAME, "KDB_INFO_BD_NAME"),
            InfoBdescNumber { .. } => (ids::INFO_BDESC_NUMBER, "KDB_INFO_BDESC_NUMBER"),
            InfoChdescLabel { .. } => (ids::INFO_CHDESC_LABEL, "KDB_INFO_CHDESC_LABEL"),
            BdescAlloc { .. } => (ids::BDESC_ALLOC, "KDB_BDESC_ALLOC"),
            BdescAllocWrap { .. } => (ids::BDESC_ALLOC_WRAP, "KDB_BDESC_ALLOC_WRAP"),
            BdescRetain { .. } => (ids::BDESC_RETAIN, "KDB_BDESC_RETAIN"),
            BdescRelease { .. } => (ids::BDESC_RELEASE, "KDB_BDESC_RELEASE"),
            BdescDestroy { .. } => (ids::BDESC_DESTROY, "KDB_BDESC_DESTROY"),
            BdescFreeDdesc { .. } => (ids::BDESC_FREE_DDESC, "KDB_BDESC_FREE_DDESC"),
            BdescAutorelease { .. } => (ids::BDESC_AUTORELEASE, "KDB_BDESC_AUTORELEASE"),
            BdescArReset { .. } => (ids::BDESC_AR_RESET, "KDB_BDESC_AR_RESET"),
            BdescArPoolPush { .. } => (ids::BDESC_AR_POOL_PUSH, "KDB_BDESC_AR_POOL_PUSH"),
            BdescArPoolPop { .. } => (ids::BDESC_AR_POOL_POP, "KDB_BDESC_AR_POOL_POP"),
            ChdescCreateNoop { .. } => (ids::CHDESC_CREATE_NOOP, "KDB_CHDESC_CREATE_NOOP"),
            ChdescCreateBit { .. } => (ids::CHDESC_CREATE_BIT, "KDB_CHDESC_CREATE_BIT"),
            ChdescCreateByte { .. } => (ids::CHDESC_CREATE_BYTE, "KDB_CHDESC_CREATE_BYTE"),
            ChdescConvertNoop { .. } => (ids::CHDESC_CONVERT_NOOP, "KDB_CHDESC_CONVERT_NOOP"),
            ChdescConvertBit { .. } => (ids::CHDESC_CONVERT_BIT, "KDB_CHDESC_CONVERT_BIT"),
            ChdescConvertByte { .. } => (ids::CHDESC_CONVERT_BYTE, "KDB_CHDESC_CONVERT_BYTE"),
            ChdescRewriteByte { .. } => (ids::CHDESC_REWRITE_BYTE, "KDB_CHDESC_REWRITE_BYTE"),
            ChdescApply { .. } => (ids::CHDESC_APPLY, "KDB_CHDESC_APPLY"),
            ChdescRollback { .. } => (ids::CHDESC_ROLLBACK, "KDB_CHDESC_ROLLBACK"),
            ChdescSetFlags { .. } => (ids::CHDESC_SET_FLAGS, "KDB_CHDESC_SET_FLAGS"),
            ChdescClearFlags { .. } => (ids::CHDESC_CLEAR_FLAGS, "KDB_CHDESC_CLEAR_FLAGS"),
            ChdescDestroy { .. } => (ids::CHDESC_DESTROY, "KDB_CHDESC_DESTROY"),
            ChdescAddBefore { .. } => (ids::CHDESC_ADD_BEFORE, "KDB_CHDESC_ADD_BEFORE"),
            ChdescAddAfter { .. } => (ids::CHDESC_ADD_AFTER, "KDB_CHDESC_ADD_AFTER"),
            ChdescRemBefore { .. } => (ids::CHDESC_REM_BEFORE, "KDB_CHDESC_REM_BEFORE"),
            ChdescRemAfter { .. } => (ids::CHDESC_REM_AFTER, "KDB_CHDESC_REM_AFTER"),
            ChdescWeakRetain { .. } => (ids::CHDESC_WEAK_RETAIN, "KDB_CHDESC_WEAK_RETAIN"),
            ChdescWeakForget { .. } => (ids::CHDESC_WEAK_FORGET, "KDB_CHDESC_WEAK_FORGET"),
            ChdescSetOffset { .. } => (ids::CHDESC_SET_OFFSET, "KDB_CHDESC_SET_OFFSET"),
            ChdescSetXor { .. } => (ids::CHDESC_SET_XOR, "KDB_CHDESC_SET_XOR"),
            ChdescSetLength { .. } => (ids::CHDESC_SET_LENGTH, "KDB_CHDESC_SET_LENGTH"),
            ChdescSetBlock { .. } => (ids::CHDESC_SET_BLOCK, "KDB_CHDESC_SET_BLOCK"),
            ChdescSetOwner { .. } => (ids::CHDESC_SET_OWNER, "KDB_CHDESC_SET_OWNER"),
            ChdescSetFreePrev { .. } => (ids::CHDESC_SET_FREE_PREV, "KDB_CHDESC_SET_FREE_PREV"),
            ChdescSetFreeNext { .. } => (ids::CHDESC_SET_FREE_NEXT, "KDB_CHDESC_SET_FREE_NEXT"),
            ChdescSetFreeHead { .. } => (ids::CHDESC_SET_FREE_HEAD, "KDB_CHDESC_SET_FREE_HEAD"),
            ChdescSatisfy { .. } => (ids::CHDESC_SATISFY, "KDB_CHDESC_SATISFY"),
            ChdescWeakCollect { .. } => (ids::CHDESC_WEAK_COLLECT, "KDB_CHDESC_WEAK_COLLECT"),
            ChdescOverlapAttach { .. } => {
                (ids::CHDESC_OVERLAP_ATTACH, "KDB_CHDESC_OVERLAP_ATTACH")
            }
            ChdescOverlapMultiattach { .. } => {
                (ids::CHDESC_OVERLAP_MULTIATTACH, "KDB_CHDESC_OVERLAP_MULTIATTACH")
            }
        }
    }

    /// The wire opcode id.
    pub fn opcode(&self) -> u16 {
        self.id().0
    }

    /// The diagnostic name, e.g. `KDB_CHDESC_ADD_BEFORE`.
    pub fn name(&self) -> &'static str {
        self.id().1
    }

    /// Whether applying this opcode changes observable system state.
    pub fn has_effect(&self) -> bool {
        use OpcodeKind::*;
        !matches!(
            self,
            InfoMark { .. }
                | InfoBdName { .. }
                | InfoBdescNumber { .. }
                | InfoChdescLabel { .. }
                | BdescFreeDdesc { .. }
                | ChdescRewriteByte { .. }
                | ChdescSatisfy { .. }
                | ChdescWeakCollect { .. }
                | ChdescOverlapAttach { .. }
                | ChdescOverlapMultiattach { .. }
        )
    }

    /// Whether single-stepping may pass over this opcode without stopping.
    pub fn is_skippable(&self) -> bool {
        self.module() == module::INFO
    }

    /// The primary change descriptor this opcode refers to, if any.
    pub fn chdesc(&self) -> Option<ChdescAddr> {
        use OpcodeKind::*;
        match self {
            InfoChdescLabel { chdesc, .. }
            | ChdescCreateNoop { chdesc, .. }
            | ChdescCreateBit { chdesc, .. }
            | ChdescCreateByte { chdesc, .. }
            | ChdescConvertNoop { chdesc }
            | ChdescConvertBit { chdesc, .. }
            | ChdescConvertByte { chdesc, .. }
            | ChdescRewriteByte { chdesc }
            | ChdescApply { chdesc }
            | ChdescRollback { chdesc }
            | ChdescSetFlags { chdesc, .. }
            | ChdescClearFlags { chdesc, .. }
            | ChdescDestroy { chdesc }
            | ChdescWeakRetain { chdesc, .. }
            | ChdescWeakForget { chdesc, .. }
            | ChdescSetOffset { chdesc, .. }
            | ChdescSetXor { chdesc, .. }
            | ChdescSetLength { chdesc, .. }
            | ChdescSetBlock { chdesc, .. }
            | ChdescSetOwner { chdesc, .. }
            | ChdescSetFreePrev { chdesc, .. }
            | ChdescSetFreeNext { chdesc, .. }
            | ChdescSetFreeHead { chdesc }
            | ChdescSatisfy { chdesc }
            | ChdescWeakCollect { chdesc }
            | ChdescOverlapMultiattach { chdesc, .. } => Some(*chdesc),
            ChdescAddBefore { source, .. }
            | ChdescAddAfter { source, .. }
            | ChdescRemBefore { source, .. }
            | ChdescRemAfter { source, .. } => Some(*source),
            ChdescOverlapAttach { recent, .. } => Some(*recent),
            _ => None,
        }
    }

    /// The fields in wire parameter order.
    pub fn fields(&self) -> Fields<'_> {
        use FieldValue::{Addr, Flags, Int, Str};
        use OpcodeKind::*;

        fn counts(f: &mut Fields<'_>, c: &RefCounts) {
            f.push(("ref_count", Int(c.ref_count)));
            f.push(("ar_count", Int(c.ar_count)));
            f.push(("dd_count", Int(c.dd_count)));
        }

        let mut f = Fields::new();
        match self {
            InfoMark { module } => f.push(("module", Int(u32::from(*module)))),
            InfoBdName { bd, name } => {
                f.push(("bd", Addr(bd.0)));
                f.push(("name", Str(name)));
            }
            InfoBdescNumber {
                block,
                number,
                count,
            } => {
                f.push(("block", Addr(block.0)));
                f.push(("number", Int(*number)));
                f.push(("count", Int(*count)));
            }
            InfoChdescLabel { chdesc, label } => {
                f.push(("chdesc", Addr(chdesc.0)));
                f.push(("label", Str(label)));
            }
            BdescAlloc {
                block,
                ddesc,
                number,
                count,
            }
            | BdescAllocWrap {
                block,
                ddesc,
                number,
                count,
            } => {
                f.push(("block", Addr(block.0)));
                f.push(("ddesc", Addr(ddesc.0)));
                f.push(("number", Int(*number)));
                f.push(("count", Int(*count)));
            }
            BdescRetain {
                block,
                ddesc,
                counts: c,
            }
            | BdescRelease {
                block,
                ddesc,
                counts: c,
            }
            | BdescAutorelease {
                block,
                ddesc,
                counts: c,
            }
            | BdescArReset {
                block,
                ddesc,
                counts: c,
            } => {
                f.push(("block", Addr(block.0)));
                f.push(("ddesc", Addr(ddesc.0)));
                counts(&mut f, c);
            }
            BdescDestroy { block, ddesc } | BdescFreeDdesc { block, ddesc } => {
                f.push(("block", Addr(block.0)));
                f.push(("ddesc", Addr(ddesc.0)));
            }
            BdescArPoolPush { depth } | BdescArPoolPop { depth } => {
                f.push(("depth", Int(*depth)));
            }
            ChdescCreateNoop { chdesc, owner } => {
                f.push(("chdesc", Addr(chdesc.0)));
                f.push(("owner", Addr(owner.0)));
            }
            ChdescCreateBit {
                chdesc,
                block,
                owner,
                offset,
                xor,
            } => {
                f.push(("chdesc", Addr(chdesc.0)));
                f.push(("block", Addr(block.0)));
                f.push(("owner", Addr(owner.0)));
                f.push(("offset", Int(u32::from(*offset))));
                f.push(("xor", Addr(*xor)));
            }
            ChdescCreateByte {
                chdesc,
                block,
                owner,
                offset,
                length,
            } => {
                f.push(("chdesc", Addr(chdesc.0)));
                f.push(("block", Addr(block.0)));
                f.push(("owner", Addr(owner.0)));
                f.push(("offset", Int(u32::from(*offset))));
                f.push(("length", Int(u32::from(*length))));
            }
            ChdescConvertBit {
                chdesc,
                offset,
                xor,
            } => {
                f.push(("chdesc", Addr(chdesc.0)));
                f.push(("offset", Int(u32::from(*offset))));
                f.push(("xor", Addr(*xor)));
            }
            ChdescConvertByte {
                chdesc,
                offset,
                length,
            } => {
                f.push(("chdesc", Addr(chdesc.0)));
                f.push(("offset", Int(u32::from(*offset))));
                f.push(("length", Int(u32::from(*length))));
            }
            ChdescConvertNoop { chdesc }
            | ChdescRewriteByte { chdesc }
            | ChdescApply { chdesc }
            | ChdescRollback { chdesc }
            | ChdescDestroy { chdesc }
            | ChdescSetFreeHead { chdesc }
            | ChdescSatisfy { chdesc }
            | ChdescWeakCollect { chdesc } => f.push(("chdesc", Addr(chdesc.0))),
            ChdescSetFlags { chdesc, flags } | ChdescClearFlags { chdesc, flags } => {
                f.push(("chdesc", Addr(chdesc.0)));
                f.push(("flags", Flags(*flags)));
            }
            ChdescAddBefore { source, target }
            | ChdescAddAfter { source, target }
            | ChdescRemBefore { source, target }
            | ChdescRemAfter { source, target } => {
                f.push(("source", Addr(source.0)));
                f.push(("target", Addr(target.0)));
            }
            ChdescWeakRetain { chdesc, location } | ChdescWeakForget { chdesc, location } => {
                f.push(("chdesc", Addr(chdesc.0)));
                f.push(("location", Addr(location.0)));
            }
            ChdescSetOffset { chdesc, offset } => {
                f.push(("chdesc", Addr(chdesc.0)));
                f.push(("offset", Int(u32::from(*offset))));
            }
            ChdescSetXor { chdesc, xor } => {
                f.push(("chdesc", Addr(chdesc.0)));
                f.push(("xor", Addr(*xor)));
            }
            ChdescSetLength { chdesc, length } => {
                f.push(("chdesc", Addr(chdesc.0)));
                f.push(("length", Int(u32::from(*length))));
            }
            ChdescSetBlock { chdesc, block } | ChdescOverlapMultiattach { chdesc, block } => {
                f.push(("chdesc", Addr(chdesc.0)));
                f.push(("block", Addr(block.0)));
            }
            ChdescSetOwner { chdesc, owner } => {
                f.push(("chdesc", Addr(chdesc.0)));
                f.push(("owner", Addr(owner.0)));
            }
            ChdescSetFreePrev { chdesc, free_prev } => {
                f.push(("chdesc", Addr(chdesc.0)));
                f.push(("free_prev", Addr(free_prev.0)));
            }
            ChdescSetFreeNext { chdesc, free_next } => {
                f.push(("chdesc", Addr(chdesc.0)));
                f.push(("free_next", Addr(free_next.0)));
            }
            ChdescOverlapAttach { recent, original } => {
                f.push(("recent", Addr(recent.0)));
                f.push(("original", Addr(original.0)));
            }
        }
        f
    }
}

impl fmt::Display for OpcodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        for (i, (name, value)) in self.fields().iter().enumerate() {
            let sep = if i == 0 { ": " } else { ", " };
            write!(f, "{sep}{name} = {value}")?;
        }
        Ok(())
    }
}

/// The instrumented call site that emitted an opcode.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Provenance {
    /// Source file of the call site.
    pub file: Arc<str>,
    /// Line number of the call site.
    pub line: u32,
    /// Enclosing function of the call site.
    pub function: Arc<str>,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}() at {}:{}", self.function, self.file, self.line)
    }
}

/// A captured call stack, shared between every opcode that recorded the
/// same sequence of return addresses.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallStack(Arc<[u32]>);

impl CallStack {
    /// Wrap an interned frame sequence.
    pub fn new(frames: Arc<[u32]>) -> Self {
        Self(frames)
    }

    /// Return addresses, innermost first.
    pub fn frames(&self) -> &[u32] {
        &self.0
    }

    /// Whether two stacks share the same storage.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

/// One decoded trace record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Opcode {
    /// The typed operation.
    pub kind: OpcodeKind,
    /// Where the operation was logged from.
    pub provenance: Provenance,
    /// The call stack at the logging point, when one was recorded.
    pub stack: Option<CallStack>,
}

impl Opcode {
    /// An opcode with no provenance or stack, for synthesized logs.
    pub fn bare(kind: OpcodeKind) -> Self {
        Self {
            kind,
            provenance: Provenance::default(),
            stack: None,
        }
    }

    /// See [`OpcodeKind::has_effect`].
    pub fn has_effect(&self) -> bool {
        self.kind.has_effect()
    }

    /// See [`OpcodeKind::is_skippable`].
    pub fn is_skippable(&self) -> bool {
        self.kind.is_skippable()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_debugger_listing() {
        let op = OpcodeKind::ChdescAddBefore {
            source: ChdescAddr(0x10),
            target: ChdescAddr(0x20),
        };
        assert_eq!(
            op.to_string(),
            "KDB_CHDESC_ADD_BEFORE: source = 0x00000010, target = 0x00000020"
        );
    }

    #[test]
    fn annotations_are_skippable_and_inert() {
        let mark = OpcodeKind::InfoMark { module: 200 };
        assert!(!mark.has_effect());
        assert!(mark.is_skippable());
        assert_eq!(mark.module(), module::INFO);

        let label = OpcodeKind::InfoChdescLabel {
            chdesc: ChdescAddr(1),
            label: "inode".into(),
        };
        assert!(!label.has_effect());
        assert!(label.is_skippable());
        assert_eq!(label.chdesc(), Some(ChdescAddr(1)));
    }

    #[test]
    fn destroy_has_effect() {
        let op = OpcodeKind::ChdescDestroy {
            chdesc: ChdescAddr(0x10),
        };
        assert!(op.has_effect());
        assert!(!op.is_skippable());
        assert_eq!(op.module(), module::CHDESC_ALTER);
        assert_eq!(op.opcode(), ids::CHDESC_DESTROY);
    }

    #[test]
    fn info_module_ops_are_informational() {
        let op = OpcodeKind::ChdescOverlapAttach {
            recent: ChdescAddr(1),
            original: ChdescAddr(2),
        };
        assert_eq!(op.module(), module::CHDESC_INFO);
        assert!(!op.has_effect());
        assert!(!op.is_skippable());
    }

    #[test]
    fn call_stack_identity() {
        let frames: Arc<[u32]> = Arc::from(vec![1u32, 2, 3]);
        let a = CallStack::new(frames.clone());
        let b = CallStack::new(frames);
        let c = CallStack::new(Arc::from(vec![1u32, 2, 3]));
        assert!(CallStack::ptr_eq(&a, &b));
        assert!(!CallStack::ptr_eq(&a, &c));
        assert_eq!(a, c);
        assert_eq!(a.frames(), &[1, 2, 3]);
    }

    #[test]
    fn flags_display_in_fields() {
        let op = OpcodeKind::ChdescSetFlags {
            chdesc: ChdescAddr(0x10),
            flags: ChdescFlags::MARKED,
        };
        assert_eq!(
            op.to_string(),
            "KDB_CHDESC_SET_FLAGS: chdesc = 0x00000010, flags = 0x1 (MARKED)"
        );
    }
}

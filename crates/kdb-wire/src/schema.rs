//! Opcode schemas and the `(module, opcode)` dispatch table.
//!
//! Every opcode declares an ordered parameter list of `(name, width)`
//! pairs. The stream repeats that description in its header and in front
//! of every record; the decoder checks it against these tables before
//! reading any values, then hands the values to the opcode's constructor.

use indexmap::IndexMap;
use smallvec::SmallVec;

use kdb_core::opcode::{ids, module};
use kdb_core::{ChdescFlags, OpcodeKind, RefCounts};

/// Width marker for a null-terminated string parameter.
pub const STRING_WIDTH: u8 = 0xFF;

/// One declared parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamSpec {
    /// Parameter name as it appears on the wire.
    pub name: &'static str,
    /// Encoded width in bytes, or [`STRING_WIDTH`].
    pub width: u8,
}

impl ParamSpec {
    /// Whether this parameter is a string.
    pub fn is_string(&self) -> bool {
        self.width == STRING_WIDTH
    }
}

const fn p(name: &'static str, width: u8) -> ParamSpec {
    ParamSpec { name, width }
}

/// A decoded parameter value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamValue {
    /// A fixed-width integer, zero-extended.
    Int(u64),
    /// A string parameter.
    Str(String),
}

/// Decoded parameter values in schema order.
///
/// Values are only ever built against a verified schema, so the typed
/// accessors narrow without checking; a mismatched slot reads as zero
/// or the empty string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params(SmallVec<[ParamValue; 5]>);

impl Params {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value.
    pub fn push(&mut self, value: ParamValue) {
        self.0.push(value);
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The values in order.
    pub fn iter(&self) -> impl Iterator<Item = &ParamValue> {
        self.0.iter()
    }

    /// Value `i` narrowed to 32 bits.
    pub fn u32(&self, i: usize) -> u32 {
        match self.0.get(i) {
            Some(ParamValue::Int(v)) => *v as u32,
            _ => 0,
        }
    }

    /// Value `i` narrowed to 16 bits.
    pub fn u16(&self, i: usize) -> u16 {
        self.u32(i) as u16
    }

    /// Value `i` converted into an identity newtype.
    pub fn addr<T: From<u32>>(&self, i: usize) -> T {
        T::from(self.u32(i))
    }

    /// Value `i` as a string.
    pub fn string(&self, i: usize) -> String {
        match self.0.get(i) {
            Some(ParamValue::Str(s)) => s.clone(),
            _ => String::new(),
        }
    }
}

/// Schema and constructor for one opcode.
#[derive(Debug)]
pub struct OpcodeSpec {
    /// Owning module id.
    pub module: u16,
    /// Opcode id, unique across modules.
    pub opcode: u16,
    /// Diagnostic name; the header must repeat it exactly.
    pub name: &'static str,
    /// Ordered parameter schema.
    pub params: &'static [ParamSpec],
    /// Builds the typed opcode from values decoded against `params`.
    pub build: fn(&Params) -> OpcodeKind,
}

/// A module's identity and the opcodes it owns.
#[derive(Debug)]
pub struct ModuleSpec {
    /// Wire module id.
    pub id: u16,
    /// Short name for diagnostics.
    pub name: &'static str,
    /// Opcodes in header order.
    pub opcodes: &'static [OpcodeSpec],
}

impl ModuleSpec {
    /// Look up an opcode of this module by id.
    pub fn opcode(&self, opcode: u16) -> Option<&OpcodeSpec> {
        self.opcodes.iter().find(|spec| spec.opcode == opcode)
    }
}

// ── Standard tables ─────────────────────────────────────────────

const ADDR: u8 = 4;
const U32: u8 = 4;
const U16: u8 = 2;

const COUNTS: [ParamSpec; 5] = [
    p("block", ADDR),
    p("ddesc", ADDR),
    p("ref_count", U32),
    p("ar_count", U32),
    p("dd_count", U32),
];

fn counts(v: &Params) -> RefCounts {
    RefCounts {
        ref_count: v.u32(2),
        ar_count: v.u32(3),
        dd_count: v.u32(4),
    }
}

/// Annotation opcodes.
pub static INFO_MODULE: ModuleSpec = ModuleSpec {
    id: module::INFO,
    name: "info",
    opcodes: &[
        OpcodeSpec {
            module: module::INFO,
            opcode: ids::INFO_MARK,
            name: "KDB_INFO_MARK",
            params: &[p("module", U16)],
            build: |v| OpcodeKind::InfoMark { module: v.u16(0) },
        },
        OpcodeSpec {
            module: module::INFO,
            opcode: ids::INFO_BD_NAME,
            name: "KDB_INFO_BD_NAME",
            params: &[p("bd", ADDR), p("name", STRING_WIDTH)],
            build: |v| OpcodeKind::InfoBdName {
                bd: v.addr(0),
                name: v.string(1),
            },
        },
        OpcodeSpec {
            module: module::INFO,
            opcode: ids::INFO_BDESC_NUMBER,
            name: "KDB_INFO_BDESC_NUMBER",
            // "count" is a 16-bit quantity in the traced code but is
            // logged as 4 bytes.
            params: &[p("block", ADDR), p("number", U32), p("count", U32)],
            build: |v| OpcodeKind::InfoBdescNumber {
                block: v.addr(0),
                number: v.u32(1),
                count: v.u32(2),
            },
        },
        OpcodeSpec {
            module: module::INFO,
            opcode: ids::INFO_CHDESC_LABEL,
            name: "KDB_INFO_CHDESC_LABEL",
            params: &[p("chdesc", ADDR), p("label", STRING_WIDTH)],
            build: |v| OpcodeKind::InfoChdescLabel {
                chdesc: v.addr(0),
                label: v.string(1),
            },
        },
    ],
};

/// Block descriptor opcodes.
pub static BDESC_MODULE: ModuleSpec = ModuleSpec {
    id: module::BDESC,
    name: "bdesc",
    opcodes: &[
        OpcodeSpec {
            module: module::BDESC,
            opcode: ids::BDESC_ALLOC,
            name: "KDB_BDESC_ALLOC",
            params: &[p("block", ADDR), p("ddesc", ADDR), p("number", U32), p("count", U32)],
            build: |v| OpcodeKind::BdescAlloc {
                block: v.addr(0),
                ddesc: v.addr(1),
                number: v.u32(2),
                count: v.u32(3),
            },
        },
        OpcodeSpec {
            module: module::BDESC,
            opcode: ids::BDESC_ALLOC_WRAP,
            name: "KDB_BDESC_ALLOC_WRAP",
            params: &[p("block", ADDR), p("ddesc", ADDR), p("number", U32), p("count", U32)],
            build: |v| OpcodeKind::BdescAllocWrap {
                block: v.addr(0),
                ddesc: v.addr(1),
                number: v.u32(2),
                count: v.u32(3),
            },
        },
        OpcodeSpec {
            module: module::BDESC,
            opcode: ids::BDESC_RETAIN,
            name: "KDB_BDESC_RETAIN",
            params: &COUNTS,
            build: |v| OpcodeKind::BdescRetain {
                block: v.addr(0),
                ddesc: v.addr(1),
                counts: counts(v),
            },
        },
        OpcodeSpec {
            module: module::BDESC,
            opcode: ids::BDESC_RELEASE,
            name: "KDB_BDESC_RELEASE",
            params: &COUNTS,
            build: |v| OpcodeKind::BdescRelease {
                block: v.addr(0),
                ddesc: v.addr(1),
                counts: counts(v),
            },
        },
        OpcodeSpec {
            module: module::BDESC,
            opcode: ids::BDESC_DESTROY,
            name: "KDB_BDESC_DESTROY",
            params: &[p("block", ADDR), p("ddesc", ADDR)],
            build: |v| OpcodeKind::BdescDestroy {
                block: v.addr(0),
                ddesc: v.addr(1),
            },
        },
        OpcodeSpec {
            module: module::BDESC,
            opcode: ids::BDESC_FREE_DDESC,
            name: "KDB_BDESC_FREE_DDESC",
            params: &[p("block", ADDR), p("ddesc", ADDR)],
            build: |v| OpcodeKind::BdescFreeDdesc {
                block: v.addr(0),
                ddesc: v.addr(1),
            },
        },
        OpcodeSpec {
            module: module::BDESC,
            opcode: ids::BDESC_AUTORELEASE,
            name: "KDB_BDESC_AUTORELEASE",
            params: &COUNTS,
            build: |v| OpcodeKind::BdescAutorelease {
                block: v.addr(0),
                ddesc: v.addr(1),
                counts: counts(v),
            },
        },
        OpcodeSpec {
            module: module::BDESC,
            opcode: ids::BDESC_AR_RESET,
            name: "KDB_BDESC_AR_RESET",
            params: &COUNTS,
            build: |v| OpcodeKind::BdescArReset {
                block: v.addr(0),
                ddesc: v.addr(1),
                counts: counts(v),
            },
        },
        OpcodeSpec {
            module: module::BDESC,
            opcode: ids::BDESC_AR_POOL_PUSH,
            name: "KDB_BDESC_AR_POOL_PUSH",
            params: &[p("depth", U32)],
            build: |v| OpcodeKind::BdescArPoolPush { depth: v.u32(0) },
        },
        OpcodeSpec {
            module: module::BDESC,
            opcode: ids::BDESC_AR_POOL_POP,
            name: "KDB_BDESC_AR_POOL_POP",
            params: &[p("depth", U32)],
            build: |v| OpcodeKind::BdescArPoolPop { depth: v.u32(0) },
        },
    ],
};

/// Change descriptor mutation opcodes.
pub static CHDESC_ALTER_MODULE: ModuleSpec = ModuleSpec {
    id: module::CHDESC_ALTER,
    name: "chdesc_alter",
    opcodes: &[
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_CREATE_NOOP,
            name: "KDB_CHDESC_CREATE_NOOP",
            params: &[p("chdesc", ADDR), p("owner", ADDR)],
            build: |v| OpcodeKind::ChdescCreateNoop {
                chdesc: v.addr(0),
                owner: v.addr(1),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_CREATE_BIT,
            name: "KDB_CHDESC_CREATE_BIT",
            params: &[
                p("chdesc", ADDR),
                p("block", ADDR),
                p("owner", ADDR),
                p("offset", U16),
                p("xor", U32),
            ],
            build: |v| OpcodeKind::ChdescCreateBit {
                chdesc: v.addr(0),
                block: v.addr(1),
                owner: v.addr(2),
                offset: v.u16(3),
                xor: v.u32(4),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_CREATE_BYTE,
            name: "KDB_CHDESC_CREATE_BYTE",
            params: &[
                p("chdesc", ADDR),
                p("block", ADDR),
                p("owner", ADDR),
                p("offset", U16),
                p("length", U16),
            ],
            build: |v| OpcodeKind::ChdescCreateByte {
                chdesc: v.addr(0),
                block: v.addr(1),
                owner: v.addr(2),
                offset: v.u16(3),
                length: v.u16(4),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_CONVERT_NOOP,
            name: "KDB_CHDESC_CONVERT_NOOP",
            params: &[p("chdesc", ADDR)],
            build: |v| OpcodeKind::ChdescConvertNoop { chdesc: v.addr(0) },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_CONVERT_BIT,
            name: "KDB_CHDESC_CONVERT_BIT",
            params: &[p("chdesc", ADDR), p("offset", U16), p("xor", U32)],
            build: |v| OpcodeKind::ChdescConvertBit {
                chdesc: v.addr(0),
                offset: v.u16(1),
                xor: v.u32(2),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_CONVERT_BYTE,
            name: "KDB_CHDESC_CONVERT_BYTE",
            params: &[p("chdesc", ADDR), p("offset", U16), p("length", U16)],
            build: |v| OpcodeKind::ChdescConvertByte {
                chdesc: v.addr(0),
                offset: v.u16(1),
                length: v.u16(2),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_REWRITE_BYTE,
            name: "KDB_CHDESC_REWRITE_BYTE",
            params: &[p("chdesc", ADDR)],
            build: |v| OpcodeKind::ChdescRewriteByte { chdesc: v.addr(0) },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_APPLY,
            name: "KDB_CHDESC_APPLY",
            params: &[p("chdesc", ADDR)],
            build: |v| OpcodeKind::ChdescApply { chdesc: v.addr(0) },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_ROLLBACK,
            name: "KDB_CHDESC_ROLLBACK",
            params: &[p("chdesc", ADDR)],
            build: |v| OpcodeKind::ChdescRollback { chdesc: v.addr(0) },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_SET_FLAGS,
            name: "KDB_CHDESC_SET_FLAGS",
            params: &[p("chdesc", ADDR), p("flags", U32)],
            build: |v| OpcodeKind::ChdescSetFlags {
                chdesc: v.addr(0),
                flags: ChdescFlags(v.u32(1)),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_CLEAR_FLAGS,
            name: "KDB_CHDESC_CLEAR_FLAGS",
            params: &[p("chdesc", ADDR), p("flags", U32)],
            build: |v| OpcodeKind::ChdescClearFlags {
                chdesc: v.addr(0),
                flags: ChdescFlags(v.u32(1)),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_DESTROY,
            name: "KDB_CHDESC_DESTROY",
            params: &[p("chdesc", ADDR)],
            build: |v| OpcodeKind::ChdescDestroy { chdesc: v.addr(0) },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_ADD_BEFORE,
            name: "KDB_CHDESC_ADD_BEFORE",
            params: &[p("source", ADDR), p("target", ADDR)],
            build: |v| OpcodeKind::ChdescAddBefore {
                source: v.addr(0),
                target: v.addr(1),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_ADD_AFTER,
            name: "KDB_CHDESC_ADD_AFTER",
            params: &[p("source", ADDR), p("target", ADDR)],
            build: |v| OpcodeKind::ChdescAddAfter {
                source: v.addr(0),
                target: v.addr(1),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_REM_BEFORE,
            name: "KDB_CHDESC_REM_BEFORE",
            params: &[p("source", ADDR), p("target", ADDR)],
            build: |v| OpcodeKind::ChdescRemBefore {
                source: v.addr(0),
                target: v.addr(1),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_REM_AFTER,
            name: "KDB_CHDESC_REM_AFTER",
            params: &[p("source", ADDR), p("target", ADDR)],
            build: |v| OpcodeKind::ChdescRemAfter {
                source: v.addr(0),
                target: v.addr(1),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_WEAK_RETAIN,
            name: "KDB_CHDESC_WEAK_RETAIN",
            params: &[p("chdesc", ADDR), p("location", ADDR)],
            build: |v| OpcodeKind::ChdescWeakRetain {
                chdesc: v.addr(0),
                location: v.addr(1),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_WEAK_FORGET,
            name: "KDB_CHDESC_WEAK_FORGET",
            params: &[p("chdesc", ADDR), p("location", ADDR)],
            build: |v| OpcodeKind::ChdescWeakForget {
                chdesc: v.addr(0),
                location: v.addr(1),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_SET_OFFSET,
            name: "KDB_CHDESC_SET_OFFSET",
            params: &[p("chdesc", ADDR), p("offset", U16)],
            build: |v| OpcodeKind::ChdescSetOffset {
                chdesc: v.addr(0),
                offset: v.u16(1),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_SET_XOR,
            name: "KDB_CHDESC_SET_XOR",
            params: &[p("chdesc", ADDR), p("xor", U32)],
            build: |v| OpcodeKind::ChdescSetXor {
                chdesc: v.addr(0),
                xor: v.u32(1),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_SET_LENGTH,
            name: "KDB_CHDESC_SET_LENGTH",
            params: &[p("chdesc", ADDR), p("length", U16)],
            build: |v| OpcodeKind::ChdescSetLength {
                chdesc: v.addr(0),
                length: v.u16(1),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_SET_BLOCK,
            name: "KDB_CHDESC_SET_BLOCK",
            params: &[p("chdesc", ADDR), p("block", ADDR)],
            build: |v| OpcodeKind::ChdescSetBlock {
                chdesc: v.addr(0),
                block: v.addr(1),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_SET_OWNER,
            name: "KDB_CHDESC_SET_OWNER",
            params: &[p("chdesc", ADDR), p("owner", ADDR)],
            build: |v| OpcodeKind::ChdescSetOwner {
                chdesc: v.addr(0),
                owner: v.addr(1),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_SET_FREE_PREV,
            name: "KDB_CHDESC_SET_FREE_PREV",
            params: &[p("chdesc", ADDR), p("free_prev", ADDR)],
            build: |v| OpcodeKind::ChdescSetFreePrev {
                chdesc: v.addr(0),
                free_prev: v.addr(1),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_SET_FREE_NEXT,
            name: "KDB_CHDESC_SET_FREE_NEXT",
            params: &[p("chdesc", ADDR), p("free_next", ADDR)],
            build: |v| OpcodeKind::ChdescSetFreeNext {
                chdesc: v.addr(0),
                free_next: v.addr(1),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_ALTER,
            opcode: ids::CHDESC_SET_FREE_HEAD,
            name: "KDB_CHDESC_SET_FREE_HEAD",
            params: &[p("chdesc", ADDR)],
            build: |v| OpcodeKind::ChdescSetFreeHead { chdesc: v.addr(0) },
        },
    ],
};

/// Change descriptor informational opcodes.
pub static CHDESC_INFO_MODULE: ModuleSpec = ModuleSpec {
    id: module::CHDESC_INFO,
    name: "chdesc_info",
    opcodes: &[
        OpcodeSpec {
            module: module::CHDESC_INFO,
            opcode: ids::CHDESC_SATISFY,
            name: "KDB_CHDESC_SATISFY",
            params: &[p("chdesc", ADDR)],
            build: |v| OpcodeKind::ChdescSatisfy { chdesc: v.addr(0) },
        },
        OpcodeSpec {
            module: module::CHDESC_INFO,
            opcode: ids::CHDESC_WEAK_COLLECT,
            name: "KDB_CHDESC_WEAK_COLLECT",
            params: &[p("chdesc", ADDR)],
            build: |v| OpcodeKind::ChdescWeakCollect { chdesc: v.addr(0) },
        },
        OpcodeSpec {
            module: module::CHDESC_INFO,
            opcode: ids::CHDESC_OVERLAP_ATTACH,
            name: "KDB_CHDESC_OVERLAP_ATTACH",
            params: &[p("recent", ADDR), p("original", ADDR)],
            build: |v| OpcodeKind::ChdescOverlapAttach {
                recent: v.addr(0),
                original: v.addr(1),
            },
        },
        OpcodeSpec {
            module: module::CHDESC_INFO,
            opcode: ids::CHDESC_OVERLAP_MULTIATTACH,
            name: "KDB_CHDESC_OVERLAP_MULTIATTACH",
            params: &[p("chdesc", ADDR), p("block", ADDR)],
            build: |v| OpcodeKind::ChdescOverlapMultiattach {
                chdesc: v.addr(0),
                block: v.addr(1),
            },
        },
    ],
};

// ── Registry ────────────────────────────────────────────────────

/// The set of modules a decoder accepts, in header order.
#[derive(Clone, Debug)]
pub struct SchemaRegistry {
    modules: IndexMap<u16, &'static ModuleSpec>,
}

impl SchemaRegistry {
    /// A registry with no modules.
    pub fn empty() -> Self {
        Self {
            modules: IndexMap::new(),
        }
    }

    /// The four modules of the supported revision, in header order.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for module in [
            &INFO_MODULE,
            &BDESC_MODULE,
            &CHDESC_ALTER_MODULE,
            &CHDESC_INFO_MODULE,
        ] {
            registry.register(module);
        }
        registry
    }

    /// Add a module. Returns `false` if its id was already registered.
    pub fn register(&mut self, module: &'static ModuleSpec) -> bool {
        if self.modules.contains_key(&module.id) {
            return false;
        }
        self.modules.insert(module.id, module);
        true
    }

    /// Registered modules in header order.
    pub fn modules(&self) -> impl Iterator<Item = &'static ModuleSpec> + '_ {
        self.modules.values().copied()
    }

    /// Look up a module by id.
    pub fn module(&self, id: u16) -> Option<&'static ModuleSpec> {
        self.modules.get(&id).copied()
    }

    /// Look up an opcode by `(module, opcode)`.
    pub fn lookup(&self, module: u16, opcode: u16) -> Option<&'static OpcodeSpec> {
        self.module(module)?.opcode(opcode)
    }

    /// The schema an opcode value encodes against.
    pub fn spec_for(&self, kind: &OpcodeKind) -> Option<&'static OpcodeSpec> {
        self.lookup(kind.module(), kind.opcode())
    }

    /// Total number of registered opcodes.
    pub fn opcode_count(&self) -> usize {
        self.modules.values().map(|m| m.opcodes.len()).sum()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params(spec: &OpcodeSpec) -> Params {
        let mut params = Params::new();
        for (i, param) in spec.params.iter().enumerate() {
            if param.is_string() {
                params.push(ParamValue::Str(format!("s{i}")));
            } else {
                params.push(ParamValue::Int(i as u64 + 1));
            }
        }
        params
    }

    #[test]
    fn every_constructor_matches_its_schema() {
        let registry = SchemaRegistry::standard();
        for module in registry.modules() {
            for spec in module.opcodes {
                let kind = (spec.build)(&sample_params(spec));
                assert_eq!(kind.module(), module.id, "{}", spec.name);
                assert_eq!(kind.module(), spec.module, "{}", spec.name);
                assert_eq!(kind.opcode(), spec.opcode, "{}", spec.name);
                assert_eq!(kind.name(), spec.name);
                let names: Vec<_> = kind.fields().iter().map(|(n, _)| *n).collect();
                let declared: Vec<_> = spec.params.iter().map(|p| p.name).collect();
                assert_eq!(names, declared, "{}", spec.name);
            }
        }
    }

    #[test]
    fn standard_registry_layout() {
        let registry = SchemaRegistry::standard();
        let ids: Vec<_> = registry.modules().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 100, 200, 300]);
        assert_eq!(registry.module(module::INFO).unwrap().opcodes.len(), 4);
        assert_eq!(registry.opcode_count(), 4 + 10 + 26 + 4);
    }

    #[test]
    fn opcode_ids_are_unique() {
        let registry = SchemaRegistry::standard();
        let mut seen = std::collections::HashSet::new();
        for module in registry.modules() {
            for spec in module.opcodes {
                assert!(seen.insert(spec.opcode), "duplicate opcode {}", spec.opcode);
            }
        }
    }

    #[test]
    fn duplicate_module_rejected() {
        let mut registry = SchemaRegistry::standard();
        assert!(!registry.register(&INFO_MODULE));
        assert_eq!(registry.modules().count(), 4);
    }

    #[test]
    fn lookup_unknown_is_none() {
        let registry = SchemaRegistry::standard();
        assert!(registry.lookup(module::INFO, 99).is_none());
        assert!(registry.lookup(7, 0).is_none());
        assert_eq!(
            registry.lookup(module::CHDESC_ALTER, ids::CHDESC_DESTROY).unwrap().name,
            "KDB_CHDESC_DESTROY"
        );
    }

    #[test]
    fn accessors_narrow() {
        let mut params = Params::new();
        params.push(ParamValue::Int(0x1_0002_0003));
        params.push(ParamValue::Str("sb".into()));
        assert_eq!(params.u32(0), 0x0002_0003);
        assert_eq!(params.u16(0), 0x0003);
        assert_eq!(params.string(1), "sb");
        assert_eq!(params.u32(1), 0);
        assert_eq!(params.string(5), "");
    }
}

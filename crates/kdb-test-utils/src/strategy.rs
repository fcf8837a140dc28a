//! Proptest strategies for randomized opcode logs.

use proptest::prelude::*;

use kdb_core::{BlockAddr, ChdescAddr, ChdescFlags, DdescAddr, Location, OpcodeKind, OwnerAddr};
use kdb_graph::SystemState;

/// Small address pools so that generated opcodes collide often.
fn chdesc() -> impl Strategy<Value = ChdescAddr> {
    (1u32..12).prop_map(|a| ChdescAddr(a * 0x10))
}

fn block() -> impl Strategy<Value = BlockAddr> {
    prop_oneof![Just(BlockAddr::NULL), (1u32..4).prop_map(|a| BlockAddr(0xb0 + a))]
}

fn owner() -> impl Strategy<Value = OwnerAddr> {
    prop_oneof![Just(OwnerAddr::NULL), (1u32..4).prop_map(|a| OwnerAddr(0xd0 + a))]
}

fn flags() -> impl Strategy<Value = ChdescFlags> {
    (0u32..0x200).prop_map(ChdescFlags)
}

/// Any opcode over the small address pools. Many are invalid in context.
pub fn arb_opcode() -> impl Strategy<Value = OpcodeKind> {
    prop_oneof![
        (0u16..4).prop_map(|module| OpcodeKind::InfoMark { module }),
        (chdesc(), "[a-z]{1,6}")
            .prop_map(|(chdesc, label)| OpcodeKind::InfoChdescLabel { chdesc, label }),
        (owner(), "[a-z]{1,6}").prop_map(|(bd, name)| OpcodeKind::InfoBdName { bd, name }),
        (block(), 0u32..100).prop_map(|(block, number)| OpcodeKind::InfoBdescNumber {
            block,
            number,
            count: 1
        }),
        (block(), 0u32..100).prop_map(|(block, number)| OpcodeKind::BdescAlloc {
            block,
            ddesc: DdescAddr(block.0 + 0x100),
            number,
            count: 1
        }),
        block().prop_map(|block| OpcodeKind::BdescDestroy {
            block,
            ddesc: DdescAddr(block.0 + 0x100)
        }),
        (chdesc(), owner())
            .prop_map(|(chdesc, owner)| OpcodeKind::ChdescCreateNoop { chdesc, owner }),
        (chdesc(), block(), owner(), any::<u16>(), any::<u32>()).prop_map(
            |(chdesc, block, owner, offset, xor)| OpcodeKind::ChdescCreateBit {
                chdesc,
                block,
                owner,
                offset,
                xor
            }
        ),
        (chdesc(), block(), owner(), any::<u16>(), any::<u16>()).prop_map(
            |(chdesc, block, owner, offset, length)| OpcodeKind::ChdescCreateByte {
                chdesc,
                block,
                owner,
                offset,
                length
            }
        ),
        chdesc().prop_map(|chdesc| OpcodeKind::ChdescConvertNoop { chdesc }),
        chdesc().prop_map(|chdesc| OpcodeKind::ChdescApply { chdesc }),
        chdesc().prop_map(|chdesc| OpcodeKind::ChdescRollback { chdesc }),
        (chdesc(), flags())
            .prop_map(|(chdesc, flags)| OpcodeKind::ChdescSetFlags { chdesc, flags }),
        (chdesc(), flags())
            .prop_map(|(chdesc, flags)| OpcodeKind::ChdescClearFlags { chdesc, flags }),
        chdesc().prop_map(|chdesc| OpcodeKind::ChdescDestroy { chdesc }),
        (chdesc(), chdesc())
            .prop_map(|(source, target)| OpcodeKind::ChdescAddBefore { source, target }),
        (chdesc(), chdesc())
            .prop_map(|(source, target)| OpcodeKind::ChdescAddAfter { source, target }),
        (chdesc(), chdesc())
            .prop_map(|(source, target)| OpcodeKind::ChdescRemBefore { source, target }),
        (chdesc(), 1u32..4).prop_map(|(chdesc, l)| OpcodeKind::ChdescWeakRetain {
            chdesc,
            location: Location(0xc000 + l)
        }),
        (chdesc(), block())
            .prop_map(|(chdesc, block)| OpcodeKind::ChdescSetBlock { chdesc, block }),
        (chdesc(), owner())
            .prop_map(|(chdesc, owner)| OpcodeKind::ChdescSetOwner { chdesc, owner }),
        (chdesc(), prop_oneof![Just(ChdescAddr::NULL), chdesc()]).prop_map(
            |(chdesc, free_next)| OpcodeKind::ChdescSetFreeNext { chdesc, free_next }
        ),
        prop_oneof![Just(ChdescAddr::NULL), chdesc()]
            .prop_map(|chdesc| OpcodeKind::ChdescSetFreeHead { chdesc }),
        chdesc().prop_map(|chdesc| OpcodeKind::ChdescSatisfy { chdesc }),
    ]
}

/// Keep only the opcodes that apply cleanly in sequence.
///
/// `SystemState::apply` leaves the state untouched on error, so the
/// result replays from scratch without a single failure.
pub fn sanitize(ops: Vec<OpcodeKind>) -> Vec<OpcodeKind> {
    let mut state = SystemState::new();
    ops.into_iter().filter(|op| state.apply(op).is_ok()).collect()
}

/// A log of up to `max_len` opcodes that replays without error.
pub fn arb_valid_log(max_len: usize) -> impl Strategy<Value = Vec<OpcodeKind>> {
    prop::collection::vec(arb_opcode(), 0..max_len).prop_map(sanitize)
}

//! Canned trace scenarios.

use kdb_core::ChdescFlags;

use crate::TraceBuilder;

/// Mark, create, flag, destroy: the smallest complete chdesc lifetime.
pub fn lifecycle_trace() -> TraceBuilder {
    TraceBuilder::new()
        .at("kfs/chdesc.c", 120, "chdesc_create_noop")
        .mark(1)
        .create_noop(0x10, 0x99)
        .set_flags(0x10, ChdescFlags::MARKED)
        .destroy(0x10)
}

/// An edge to `0xb` logged before `0xb` is created.
pub fn forward_reference_trace() -> TraceBuilder {
    TraceBuilder::new()
        .create_noop(0xa, 0x1)
        .add_before(0xa, 0xb)
        .create_noop(0xb, 0x2)
}

/// Two devices, two blocks, four chdescs spread across them.
///
/// | chdesc | block | owner |
/// |--------|-------|-------|
/// | 0x100  | 0xb1  | 0xd1  |
/// | 0x101  | 0xb1  | 0xd2  |
/// | 0x102  | 0xb2  | 0xd1  |
/// | 0x103  | none  | 0xd2  |
pub fn grouped_trace() -> TraceBuilder {
    TraceBuilder::new()
        .bd_name(0xd1, "journal")
        .bd_name(0xd2, "disk0")
        .alloc(0xb1, 0xe1, 17, 1)
        .alloc(0xb2, 0xe2, 18, 1)
        .bdesc_number(0xb1, 17, 1)
        .create_byte(0x100, 0xb1, 0xd1, 0, 512)
        .create_bit(0x101, 0xb1, 0xd2, 4, 0x80)
        .create_byte(0x102, 0xb2, 0xd1, 64, 16)
        .create_noop(0x103, 0xd2)
        .add_before(0x101, 0x100)
        .add_after(0x100, 0x101)
        .add_before(0x103, 0x102)
        .label(0x100, "superblock")
        .label(0x100, "superblock")
        .weak_retain(0x102, 0xc0de)
}

/// Three chdescs threaded on the allocator free list, head first.
pub fn free_list_trace() -> TraceBuilder {
    TraceBuilder::new()
        .create_noop(0x1, 0)
        .create_noop(0x2, 0)
        .create_noop(0x3, 0)
        .set_free_next(0x1, 0x2)
        .set_free_prev(0x2, 0x1)
        .set_free_next(0x2, 0x3)
        .set_free_prev(0x3, 0x2)
        .set_free_head(0x1)
}

//! Benchmark workloads for the kdb trace debugger.
//!
//! Provides deterministic synthetic traces shaped like a busy
//! write-ordering subsystem:
//!
//! - [`reference_workload`]: 2K chdescs over 64 blocks and 4 devices
//! - [`stress_workload`]: 20K chdescs over 512 blocks and 8 devices
//! - [`build_trace`]: expands a [`Workload`] into a [`TraceBuilder`]

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use kdb_core::ChdescFlags;
use kdb_test_utils::TraceBuilder;

/// Shape of a synthetic trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Workload {
    /// Chdescs created over the trace.
    pub chdescs: u32,
    /// Distinct blocks they are spread over.
    pub blocks: u32,
    /// Distinct owning devices.
    pub owners: u32,
    /// Generator seed.
    pub seed: u64,
}

/// 2K chdescs over 64 blocks and 4 devices.
pub fn reference_workload(seed: u64) -> Workload {
    Workload {
        chdescs: 2_000,
        blocks: 64,
        owners: 4,
        seed,
    }
}

/// 20K chdescs over 512 blocks and 8 devices.
pub fn stress_workload(seed: u64) -> Workload {
    Workload {
        chdescs: 20_000,
        blocks: 512,
        owners: 8,
        seed,
    }
}

/// 64-bit LCG with Knuth's MMIX constants.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u32) -> u32 {
        (self.next() % u64::from(n.max(1))) as u32
    }
}

const CHDESC_BASE: u32 = 0x1000_0000;
const BLOCK_BASE: u32 = 0xb000_0000;
const DDESC_BASE: u32 = 0xe000_0000;
const OWNER_BASE: u32 = 0xd000_0000;

/// Expand `workload` into a trace that replays without error.
///
/// Each chdesc is created on a random block and device, depends on up to
/// two recent live chdescs, is applied or flagged along the way, and most
/// are destroyed a few dozen creations later. Every destroyed chdesc is
/// pushed onto the allocator free list first.
pub fn build_trace(workload: &Workload) -> TraceBuilder {
    let mut rng = Lcg(workload.seed);
    let mut trace = TraceBuilder::new().at("kfs/chdesc.c", 1, "chdesc_create");

    for i in 0..workload.owners {
        trace = trace.bd_name(OWNER_BASE + i, &format!("dev{i}"));
    }
    for i in 0..workload.blocks {
        trace = trace
            .alloc(BLOCK_BASE + i, DDESC_BASE + i, i, 1)
            .bdesc_number(BLOCK_BASE + i, i, 1);
    }

    let mut live: Vec<u32> = Vec::new();
    let mut free_head: Option<u32> = None;
    for i in 0..workload.chdescs {
        let addr = CHDESC_BASE + i * 0x40;
        let block = BLOCK_BASE + rng.below(workload.blocks);
        let owner = OWNER_BASE + rng.below(workload.owners);
        trace = match rng.below(3) {
            0 => trace.create_noop(addr, owner),
            1 => trace.create_bit(addr, block, owner, rng.below(4096) as u16, 1 << rng.below(32)),
            _ => trace.create_byte(addr, block, owner, rng.below(4096) as u16, 1 + rng.below(512) as u16),
        };

        let window = live.len().min(32) as u32;
        for _ in 0..rng.below(3).min(window) {
            let target = live[live.len() - 1 - rng.below(window) as usize];
            trace = trace.add_before(addr, target).add_after(target, addr);
        }
        match rng.below(4) {
            0 => trace = trace.apply(addr),
            1 => trace = trace.set_flags(addr, ChdescFlags::MARKED),
            _ => {}
        }
        if rng.below(16) == 0 {
            trace = trace.label(addr, "sync");
        }
        live.push(addr);

        if live.len() > 48 && rng.below(4) != 0 {
            let victim = live.remove(rng.below(16) as usize);
            trace = trace.set_flags(victim, ChdescFlags::FREEING);
            if let Some(head) = free_head {
                trace = trace.set_free_next(victim, head).set_free_prev(head, victim);
            }
            trace = trace.set_free_head(victim);
            free_head = Some(victim);
            if rng.below(2) == 0 {
                trace = trace.set_free_head(0).destroy(victim);
                free_head = None;
            }
        }
    }
    trace
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_is_deterministic() {
        let w = Workload {
            chdescs: 200,
            ..reference_workload(7)
        };
        assert_eq!(build_trace(&w).kinds(), build_trace(&w).kinds());
    }

    #[test]
    fn seeds_differ() {
        let a = build_trace(&Workload {
            chdescs: 200,
            ..reference_workload(1)
        });
        let b = build_trace(&Workload {
            chdescs: 200,
            ..reference_workload(2)
        });
        assert_ne!(a.kinds(), b.kinds());
    }

    #[test]
    fn reference_trace_encodes() {
        let bytes = build_trace(&reference_workload(42)).try_build().unwrap();
        assert!(bytes.len() > 10_000);
    }
}

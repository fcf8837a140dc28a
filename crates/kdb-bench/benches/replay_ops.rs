//! Criterion micro-benchmarks for replay, seeking, fingerprinting and rendering.

use std::hint::black_box;
use std::io::Cursor;

use criterion::{criterion_group, criterion_main, Criterion};
use kdb_bench::{build_trace, reference_workload};
use kdb_graph::SystemState;
use kdb_render::{render_state, GraphEvent, RenderOptions};
use kdb_replay::{Debugger, DebuggerConfig, Extreme};

fn loaded() -> Debugger<Cursor<Vec<u8>>> {
    let bytes = build_trace(&reference_workload(42)).build();
    Debugger::open("bench", Cursor::new(bytes), DebuggerConfig::default()).unwrap()
}

/// Benchmark: Reset and replay the whole reference trace.
fn bench_replay_all(c: &mut Criterion) {
    let mut dbg = loaded();

    c.bench_function("replay_all_reference", |b| {
        b.iter(|| {
            dbg.reset_state();
            dbg.replay_all().unwrap();
            black_box(dbg.state().chdesc_count());
        });
    });
}

/// Benchmark: Seek from the end back to the midpoint, which replays from zero.
fn bench_seek_backward(c: &mut Criterion) {
    let mut dbg = loaded();
    let mid = dbg.opcode_count() / 2;

    c.bench_function("seek_backward_midpoint", |b| {
        b.iter(|| {
            dbg.replay_all().unwrap();
            dbg.seek(mid).unwrap();
            black_box(dbg.applied());
        });
    });
}

/// Benchmark: Locate the peak live chdesc count over the whole trace.
fn bench_find_max(c: &mut Criterion) {
    let mut dbg = loaded();
    let end = dbg.opcode_count();

    c.bench_function("find_max_reference", |b| {
        b.iter(|| {
            let at = dbg.find_extreme(Extreme::Max, 0..=end).unwrap();
            black_box(at);
        });
    });
}

/// Benchmark: Fingerprint the fully replayed reference state.
fn bench_fingerprint(c: &mut Criterion) {
    let mut dbg = loaded();
    dbg.replay_all().unwrap();
    let state: SystemState = dbg.state().clone();

    c.bench_function("fingerprint_reference", |b| {
        b.iter(|| black_box(state.fingerprint()));
    });
}

/// Benchmark: Render the fully replayed reference state with nested grouping.
fn bench_render_grouped(c: &mut Criterion) {
    let mut dbg = loaded();
    dbg.replay_all().unwrap();
    let mut options = RenderOptions::default();
    options.set("grouping", "block-owner").unwrap();

    c.bench_function("render_block_owner", |b| {
        b.iter(|| {
            let mut events: Vec<GraphEvent> = Vec::new();
            let summary = render_state(dbg.state(), &options, &mut events);
            black_box(summary);
        });
    });
}

criterion_group!(
    benches,
    bench_replay_all,
    bench_seek_backward,
    bench_find_max,
    bench_fingerprint,
    bench_render_grouped
);
criterion_main!(benches);

//! Criterion micro-benchmarks for trace decoding and encoding.

use std::hint::black_box;
use std::io::Cursor;

use criterion::{criterion_group, criterion_main, Criterion};
use kdb_bench::{build_trace, reference_workload, stress_workload};
use kdb_replay::{Debugger, DebuggerConfig};
use kdb_wire::{DecoderConfig, TraceDecoder};

/// Benchmark: Decode every opcode of the reference trace.
fn bench_decode_reference(c: &mut Criterion) {
    let bytes = build_trace(&reference_workload(42)).build();

    c.bench_function("decode_reference", |b| {
        b.iter(|| {
            let mut decoder = TraceDecoder::open(bytes.as_slice(), DecoderConfig::default()).unwrap();
            let mut n = 0usize;
            while let Some(op) = decoder.next_opcode().unwrap() {
                black_box(&op);
                n += 1;
            }
            black_box(n);
        });
    });
}

/// Benchmark: Open the stress trace in a debugger, decoding ahead to EOF.
fn bench_load_stress(c: &mut Criterion) {
    let bytes = build_trace(&stress_workload(42)).build();

    c.bench_function("load_stress", |b| {
        b.iter(|| {
            let dbg = Debugger::open("bench", Cursor::new(bytes.as_slice()), DebuggerConfig::default())
                .unwrap();
            black_box(dbg.opcode_count());
        });
    });
}

/// Benchmark: Encode the reference trace.
fn bench_encode_reference(c: &mut Criterion) {
    let trace = build_trace(&reference_workload(42));

    c.bench_function("encode_reference", |b| {
        b.iter(|| {
            let bytes = trace.try_build().unwrap();
            black_box(bytes.len());
        });
    });
}

criterion_group!(
    benches,
    bench_decode_reference,
    bench_load_stress,
    bench_encode_reference
);
criterion_main!(benches);

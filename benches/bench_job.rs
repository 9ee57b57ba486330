// Pickle Prefetching Accelerator Rust Bindings
// SPDX-License-Identifier: MIT

//! Benchmarks for job assembly and wire serialization.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pickle_rs::{AddressRange, ArrayDescriptor, DescriptorArena, Job};

fn build_job(n: usize) -> (DescriptorArena, Job) {
    let mut arena = DescriptorArena::new();
    let mut job = Job::new("bfs");
    let mut prev = None;
    for i in 0..n {
        let base = 0x10_0000 + (i as u64) * 0x1000;
        let handle = arena.insert(ArrayDescriptor::new(
            AddressRange::new(base, base + 0x800),
            8,
        ));
        if let Some(prev) = prev {
            arena.link_indexed_by(handle, prev);
        }
        job.register(&mut arena, handle);
        prev = Some(handle);
    }
    (arena, job)
}

/// Benchmark serialization of jobs with varying descriptor counts.
fn bench_serialize(c: &mut Criterion) {
    let counts = vec![1usize, 4, 16, 64, 255];

    let mut group = c.benchmark_group("job_serialize");

    for n in counts {
        let (arena, job) = build_job(n);
        let wire_len = job.serialize(&arena).unwrap().len();
        group.throughput(Throughput::Bytes(wire_len as u64));

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| job.serialize(&arena).unwrap());
        });
    }

    group.finish();
}

/// Benchmark registration (id densification) for one job.
fn bench_register(c: &mut Criterion) {
    let mut group = c.benchmark_group("job_register");

    for n in [16usize, 255] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| build_job(n));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_serialize, bench_register);
criterion_main!(benches);

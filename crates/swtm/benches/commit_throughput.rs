// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::cast_precision_loss)] // Stats/metrics need this
#![allow(clippy::cast_sign_loss)] // Test data conversions
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::missing_panics_doc)] // Benches panic on failure
#![allow(clippy::missing_errors_doc)] // Bench documentation
#![allow(clippy::too_many_lines)] // Bench code

//! Commit throughput across algorithm families.
//!
//! Measures:
//! - Single-threaded commit rate for a handful of representative variants
//! - Read-only vs. read-write transaction cost
//! - Contended multi-thread throughput on a shared counter

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use swtm::{Stm, Tunables};

const SINGLE_THREADED_VARIANTS: &[&str] = &[
    "orec-eager",
    "orec-lazy",
    "byte-eager",
    "ring-sw",
    "ctoken",
    "nano",
    "pessimistic",
];

/// Single committing thread, no contention: isolates each algorithm's
/// fixed per-transaction overhead (log reset, orec CAS, validation).
fn bench_uncontended_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended_commit");
    group.throughput(Throughput::Elements(1));

    for name in SINGLE_THREADED_VARIANTS {
        let mut stm = Stm::new(Tunables::default());
        stm.switch_to(name).unwrap();
        let mut cell: u64 = 0;
        let addr = &mut cell as *mut u64 as usize;

        group.bench_with_input(BenchmarkId::new("write", name), name, |b, _| {
            b.iter(|| {
                stm.atomic(|s| {
                    let v = s.read(addr, u64::MAX)?;
                    s.write(addr, v + 1, u64::MAX)
                })
                .unwrap();
            })
        });
    }
    group.finish();
}

/// Read-only transactions over a handful of addresses, no writes.
fn bench_read_only_transaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_only_commit");

    let mut cells = [0u64; 8];
    let addrs: Vec<usize> = cells.iter_mut().map(|c| c as *mut u64 as usize).collect();

    for name in ["orec-eager", "byte-eager", "ctoken", "pessimistic"] {
        let mut stm = Stm::new(Tunables::default());
        stm.switch_to(name).unwrap();

        group.bench_with_input(BenchmarkId::new("read8", name), name, |b, _| {
            b.iter(|| {
                stm.atomic(|s| {
                    for &addr in &addrs {
                        s.read(addr, u64::MAX)?;
                    }
                    Ok(())
                })
                .unwrap();
            })
        });
    }
    group.finish();
}

/// Contended throughput: N threads racing to increment one shared word,
/// measured for the orec-eager baseline (spec.md SS4.2's reference point)
/// and the ring-sw family, which bounds retries via window rollover
/// instead of an open-ended orec retry loop.
fn bench_contended_counter(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_counter");
    group.sample_size(20);

    for &threads in &[2usize, 4, 8] {
        for name in ["orec-eager", "ring-sw"] {
            group.throughput(Throughput::Elements(threads as u64));
            let mut cell = 0u64;
            let addr = &mut cell as *mut u64 as usize;
            group.bench_with_input(
                BenchmarkId::new(name, threads),
                &threads,
                |b, &threads| {
                    b.iter(|| {
                        let mut stm = Stm::new(Tunables::default());
                        stm.switch_to(name).unwrap();
                        let stm = Arc::new(stm);
                        let counter = Arc::new(AtomicU64::new(0));
                        let start = Arc::new(Barrier::new(threads));

                        let handles: Vec<_> = (0..threads)
                            .map(|_| {
                                let stm = Arc::clone(&stm);
                                let counter = Arc::clone(&counter);
                                let start = Arc::clone(&start);
                                thread::spawn(move || {
                                    start.wait();
                                    for _ in 0..200 {
                                        stm.atomic(|s| {
                                            let v = s.read(addr, u64::MAX)?;
                                            s.write(addr, v + 1, u64::MAX)
                                        })
                                        .unwrap();
                                        counter.fetch_add(1, Ordering::Relaxed);
                                    }
                                })
                            })
                            .collect();
                        for h in handles {
                            h.join().unwrap();
                        }
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(
    commit_benches,
    bench_uncontended_commit,
    bench_read_only_transaction,
    bench_contended_counter,
);
criterion_main!(commit_benches);

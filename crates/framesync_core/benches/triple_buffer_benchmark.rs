//! # Triple Buffer Benchmark
//!
//! Measures the steady-state cost of the producer and consumer paths:
//! 1. Write + commit (producer)
//! 2. Read of the active slot (consumer)
//! 3. A full tracked frame: write N cells, commit, activate

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use framesync_core::{FrameTracker, TripleBuffer};

fn bench_write_commit(c: &mut Criterion) {
    let cell = TripleBuffer::with_value([0.0_f32; 16]);

    c.bench_function("triple_buffer_write_commit", |b| {
        b.iter(|| {
            cell.write(black_box([1.0; 16]));
            cell.advance_commit();
        });
    });
}

fn bench_read_active(c: &mut Criterion) {
    let cell = TripleBuffer::with_value([0.0_f32; 16]);

    c.bench_function("triple_buffer_read_active", |b| {
        b.iter(|| black_box(cell.read_active()[0]));
    });
}

fn bench_tracked_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("triple_buffer_tracked_frame");

    for cell_count in [100_usize, 1_000, 10_000] {
        let tracker = FrameTracker::new();
        let cells: Vec<_> = (0..cell_count)
            .map(|_| TripleBuffer::tracked(&tracker, 0_u64))
            .collect();

        group.bench_with_input(
            BenchmarkId::new("write_commit_activate", cell_count),
            &cell_count,
            |b, _| {
                let mut frame = 0_u64;
                b.iter(|| {
                    frame += 1;
                    for cell in &cells {
                        cell.write(frame);
                    }
                    let touched = tracker.commit_touched();
                    tracker.activate(touched);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_write_commit, bench_read_active, bench_tracked_frame);
criterion_main!(benches);

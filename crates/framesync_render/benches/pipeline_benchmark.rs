//! # Pipeline Benchmark
//!
//! Measures the render-side hot paths:
//! 1. Submit + poll with a batch of bindings rebound every frame
//! 2. Entity binding resolution on the recording path
//! 3. Worker pool round trip (enqueue + wait)

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use framesync_core::{FrameTracker, Guid};
use framesync_render::{
    Association, BindingResolver, BindingTables, FramePipeline, ScopeId, ScopeKind, StatusCell,
    ValidationMode, WorkerPool,
};

fn bench_submit_poll(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_submit_poll");

    for entities in [16_u32, 256, 4_096] {
        let tracker = FrameTracker::new();
        let bindings = BindingTables::new(&tracker);
        let pipeline = FramePipeline::new(&tracker);
        let vb0 = Guid::new("VB0");
        let meshes = [Guid::new("cube_vb"), Guid::new("sphere_vb")];

        for entity in 0..entities {
            bindings.bind(ScopeKind::Entity, ScopeId(entity), vb0, meshes[0]);
        }
        pipeline.submit(0_usize);
        pipeline.consumer_poll();

        group.bench_with_input(
            BenchmarkId::new("rebind_all", entities),
            &entities,
            |b, &entities| {
                let mut frame = 0_usize;
                b.iter(|| {
                    frame += 1;
                    let mesh = meshes[frame % 2];
                    for entity in 0..entities {
                        bindings.bind(ScopeKind::Entity, ScopeId(entity), vb0, mesh);
                    }
                    pipeline.submit(frame);
                    black_box(pipeline.consumer_poll());
                });
            },
        );
    }

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let tracker = FrameTracker::new();
    let bindings = BindingTables::new(&tracker);
    let pipeline = FramePipeline::new(&tracker);
    let vb0 = Guid::new("VB0");
    bindings.bind(ScopeKind::Entity, ScopeId(7), vb0, Guid::new("cube_vb"));
    pipeline.submit(());
    pipeline.consumer_poll();

    let resolver = BindingResolver::new(&bindings, ValidationMode::Unchecked);
    c.bench_function("binding_resolve_entity", |b| {
        b.iter(|| {
            black_box(resolver.resolve(Association::Entity, black_box(vb0), Some(ScopeId(7)), None))
        });
    });
}

fn bench_pool_round_trip(c: &mut Criterion) {
    let Ok(pool) = WorkerPool::new(4) else {
        return;
    };

    c.bench_function("worker_pool_enqueue_wait", |b| {
        b.iter(|| {
            let cell = StatusCell::new();
            if pool.enqueue(|| {}, Some(cell.clone())).is_ok() {
                cell.wait();
            }
        });
    });
}

criterion_group!(benches, bench_submit_poll, bench_resolve, bench_pool_round_trip);
criterion_main!(benches);

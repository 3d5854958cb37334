//! Discrete segment import benchmarks.

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use labelmap_bench::{cube, slab_segments};
use labelmap_core::{
    align_first_slice, write_segment, Config, InMemoryEngine, InMemoryViewportGroups,
    SegmentationManager,
};
use labelmap_volume::{InMemoryVolumeStore, Volume};
use std::sync::Arc;

/// Benchmark merging slabs into a destination buffer.
fn bench_write_segments(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_segment");

    for frames_per_segment in [1, 4, 16] {
        let geometry = cube(128, 64);
        let segments = slab_segments(&geometry, frames_per_segment);
        group.throughput(Throughput::Elements(geometry.voxel_count() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(frames_per_segment),
            &segments,
            |b, segments| {
                b.iter_batched(
                    || vec![0u16; geometry.voxel_count()],
                    |mut destination| {
                        for (slab, segment) in segments.iter().enumerate() {
                            let clipped = write_segment(
                                &mut destination,
                                &geometry,
                                slab * frames_per_segment,
                                segment,
                            );
                            black_box(clipped);
                        }
                        black_box(destination);
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

/// Benchmark the slice alignment check.
fn bench_align(c: &mut Criterion) {
    let geometry = cube(128, 256);

    c.bench_function("align_first_slice", |b| {
        b.iter(|| {
            let alignment = align_first_slice(&geometry, black_box([0.0, 0.0, 117.0]), 1e-4);
            black_box(alignment);
        });
    });
}

/// Benchmark a full import through the manager.
fn bench_import(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let geometry = cube(64, 32);
    let segments = slab_segments(&geometry, 4);

    c.bench_function("create_from_discrete_segments", |b| {
        b.iter_batched(
            || {
                let volumes = Arc::new(InMemoryVolumeStore::new());
                volumes.insert(Volume::zeroed("ct", geometry));
                SegmentationManager::with_volume_store(
                    Config::default(),
                    Arc::new(InMemoryEngine::new()),
                    Arc::new(InMemoryViewportGroups::with_group("default", &["axial"])),
                    volumes,
                )
            },
            |manager| {
                let record = runtime
                    .block_on(manager.create_from_discrete_segments("ct", segments.clone(), "seg"))
                    .unwrap();
                black_box(record);
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_write_segments, bench_align, bench_import);
criterion_main!(benches);

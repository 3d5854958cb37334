//! Segment removal scan benchmarks.

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use labelmap_bench::{cube, striped_labels};
use labelmap_core::clear_label;

/// Benchmark clearing one label from volumes of increasing size.
fn bench_clear_label(c: &mut Criterion) {
    let mut group = c.benchmark_group("clear_label");

    for edge in [64, 128, 256] {
        let geometry = cube(edge, 64);
        let voxels = striped_labels(&geometry, 8, 97);
        group.throughput(Throughput::Elements(geometry.voxel_count() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(edge), &voxels, |b, voxels| {
            b.iter_batched(
                || voxels.clone(),
                |mut data| {
                    let frames = clear_label(&mut data, geometry.frame_len(), black_box(3));
                    black_box(frames);
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

/// Benchmark a scan that finds nothing to clear.
fn bench_clear_absent(c: &mut Criterion) {
    let geometry = cube(128, 64);
    let mut voxels = striped_labels(&geometry, 8, 97);

    c.bench_function("clear_label/absent", |b| {
        b.iter(|| {
            let frames = clear_label(&mut voxels, geometry.frame_len(), black_box(200));
            black_box(frames);
        });
    });
}

criterion_group!(benches, bench_clear_label, bench_clear_absent);
criterion_main!(benches);

//! Criterion micro-benchmarks for tile lookup and pixel iteration.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use tessera_bench::{bench_config, checkerboard, BenchStore};
use tessera_core::Rect;

/// Benchmark: 0x7fff read-only lookups on a half-populated 64x64 grid.
fn bench_read_only_lookup(c: &mut Criterion) {
    let store = BenchStore::new(bench_config);
    let dm = checkerboard(store.handle(), 64, 64, &[5]);

    c.bench_function("read_only_lookup_0x7fff", |b| {
        b.iter(|| {
            let mut existing = 0usize;
            for i in 0..0x7fff_i32 {
                let (_, exists) = dm.get_read_only_tile_lazy(i % 64, (i / 64) % 64);
                existing += usize::from(exists);
            }
            black_box(existing)
        });
    });
}

/// Benchmark: read a 1024x1024 area through the line iterator runs.
fn bench_hline_read(c: &mut Criterion) {
    let store = BenchStore::new(bench_config);
    let dm = checkerboard(store.handle(), 16, 16, &[5]);
    let rect = Rect::new(0, 0, 1024, 1024);

    c.bench_function("hline_read_1024x1024", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            let mut it = dm.hline_iterator(rect.x, rect.y, rect.width, false).unwrap();
            for _ in 0..rect.height {
                loop {
                    sum += it.raw_data().iter().map(|&v| u64::from(v)).sum::<u64>();
                    let n = it.n_conseq_pixels();
                    if !it.next_pixels(n).unwrap() {
                        break;
                    }
                }
                it.next_row().unwrap();
            }
            black_box(sum)
        });
    });
}

/// Benchmark: bulk read of the same area into one buffer.
fn bench_read_bytes(c: &mut Criterion) {
    let store = BenchStore::new(bench_config);
    let dm = checkerboard(store.handle(), 16, 16, &[5]);
    let rect = Rect::new(0, 0, 1024, 1024);
    let mut buf = vec![0u8; rect.area()];

    c.bench_function("read_bytes_1024x1024", |b| {
        b.iter(|| {
            dm.read_bytes(rect, &mut buf).unwrap();
            black_box(&buf);
        });
    });
}

criterion_group!(benches, bench_read_only_lookup, bench_hline_read, bench_read_bytes);
criterion_main!(benches);

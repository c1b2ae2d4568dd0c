//! Criterion micro-benchmarks for swap space allocation and swapping.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tessera_bench::{bench_config, BenchStore};
use tessera_core::MAP_GRANULARITY;
use tessera_swap::ChunkAllocator;

/// Benchmark: 4096 allocations of mixed size with random frees in between.
fn bench_chunk_churn(c: &mut Criterion) {
    c.bench_function("chunk_allocator_churn_4096", |b| {
        b.iter(|| {
            let alloc = ChunkAllocator::new(MAP_GRANULARITY, 1 << 32);
            let mut rng = ChaCha8Rng::seed_from_u64(17);
            let mut live = Vec::with_capacity(1024);
            for _ in 0..4096 {
                if !live.is_empty() && rng.random_range(0..3) == 0 {
                    let i = rng.random_range(0..live.len());
                    alloc.free_chunk(live.swap_remove(i)).unwrap();
                } else {
                    live.push(alloc.get_chunk(rng.random_range(64..16_384)).unwrap());
                }
            }
            black_box(alloc.store_size())
        });
    });
}

/// Benchmark: swap out 64 distinct tiles and read them all back.
fn bench_swap_round_trip(c: &mut Criterion) {
    let store = BenchStore::new(bench_config);
    let handle = store.handle();

    c.bench_function("swap_out_in_64_tiles", |b| {
        b.iter_batched(
            || {
                (0..64u8)
                    .map(|i| handle.create_filled(&[i, 0, 0, 255]).unwrap())
                    .collect::<Vec<_>>()
            },
            |tiles| {
                handle.force_swap_out_all().unwrap();
                for tile in &tiles {
                    black_box(tile.read().unwrap()[0]);
                }
                tiles
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_chunk_churn, bench_swap_round_trip);
criterion_main!(benches);

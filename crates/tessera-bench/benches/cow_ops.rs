//! Criterion micro-benchmarks for copy-on-write of shared tiles.

use std::hint::black_box;
use std::path::Path;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tessera_bench::{pooled_config, unpooled_config, BenchStore};
use tessera_core::{Rect, StoreConfig, TILE_WIDTH};
use tessera_tiles::TiledDataManager;

const TILES: i32 = 16;

/// A row of `TILES` tiles all sharing one filled version.
fn shared_row(store: &BenchStore) -> TiledDataManager {
    let dm = TiledDataManager::new(store.handle(), &[0; 4]).unwrap();
    dm.clear(Rect::new(0, 0, TILES * TILE_WIDTH, TILE_WIDTH), &[9; 4])
        .unwrap();
    dm
}

fn bench_first_write(c: &mut Criterion, name: &str, profile: fn(&Path) -> StoreConfig) {
    let store = BenchStore::new(profile);
    c.bench_function(name, |b| {
        b.iter_batched(
            || {
                let dm = shared_row(&store);
                store.handle().run_pooler_pass();
                dm
            },
            |dm| {
                for col in 0..TILES {
                    dm.set_pixel(col * TILE_WIDTH, 0, &[1; 4]).unwrap();
                }
                black_box(dm)
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark: first write to 16 shared tiles with prepared clones.
fn bench_cow_pooled(c: &mut Criterion) {
    bench_first_write(c, "cow_first_write_pooled", pooled_config);
}

/// Benchmark: the same writes copying on the writing thread.
fn bench_cow_unpooled(c: &mut Criterion) {
    bench_first_write(c, "cow_first_write_unpooled", unpooled_config);
}

/// Benchmark: undo and redo of one transaction touching 16 tiles.
fn bench_undo_redo(c: &mut Criterion) {
    let store = BenchStore::new(unpooled_config);
    let dm = shared_row(&store);
    let _m = dm.get_memento();
    dm.clear(Rect::new(0, 0, TILES * TILE_WIDTH, 8), &[3; 4])
        .unwrap();
    dm.commit();

    c.bench_function("undo_redo_16_tiles", |b| {
        b.iter(|| {
            black_box(dm.rollback().unwrap());
            black_box(dm.rollforward().unwrap());
        });
    });
}

criterion_group!(benches, bench_cow_pooled, bench_cow_unpooled, bench_undo_redo);
criterion_main!(benches);

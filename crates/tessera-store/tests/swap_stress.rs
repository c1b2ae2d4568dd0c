//! Integration test: concurrent writers against repeated full swap-outs.
//!
//! Each worker thread owns a disjoint set of buffers and repeatedly
//! rewrites and verifies them, while another thread forces every unlocked
//! buffer into the swap file. No write may be lost across a swap cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tessera_core::{StoreConfig, MAP_GRANULARITY, TILE_PIXELS};
use tessera_store::TileDataStore;

const THREADS: usize = 4;
const TILES_PER_THREAD: usize = 16;
const ROUNDS: u8 = 20;

#[test]
fn writes_survive_concurrent_swapping() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::default()
        .with_swap_dir(dir.path())
        .with_swap_sizes(MAP_GRANULARITY, 4 * MAP_GRANULARITY, 1024 * MAP_GRANULARITY)
        .with_worker_backoff(Duration::from_millis(1), Duration::from_millis(20));
    let mut store = TileDataStore::new(config).unwrap();
    let handle = store.handle().clone();
    let done = Arc::new(AtomicBool::new(false));

    let swapper = {
        let handle = handle.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                handle.force_swap_out_all().unwrap();
                thread::yield_now();
            }
        })
    };

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let handle = handle.clone();
            thread::spawn(move || {
                let tiles: Vec<_> = (0..TILES_PER_THREAD)
                    .map(|_| handle.create_filled(&[t as u8, 0]).unwrap())
                    .collect();
                for round in 1..=ROUNDS {
                    for (i, tile) in tiles.iter().enumerate() {
                        let mut pixels = tile.write().unwrap();
                        for px in pixels.chunks_exact_mut(2) {
                            px[0] = t as u8;
                            px[1] = round.wrapping_add(i as u8);
                        }
                    }
                    for (i, tile) in tiles.iter().enumerate() {
                        let pixels = tile.read().unwrap();
                        assert_eq!(pixels.len(), 2 * TILE_PIXELS);
                        assert!(pixels
                            .chunks_exact(2)
                            .all(|px| px == [t as u8, round.wrapping_add(i as u8)]));
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    done.store(true, Ordering::Release);
    swapper.join().unwrap();

    let stats = handle.stats();
    assert_eq!(stats.live_tile_data, 0);
    assert_eq!(stats.swapped_tile_data, 0);
    assert!(stats.swap_ins <= stats.swap_outs);
    store.shutdown().unwrap();
}

#[test]
fn shared_readers_race_full_swaps() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::default()
        .with_swap_dir(dir.path())
        .with_swap_sizes(MAP_GRANULARITY, 4 * MAP_GRANULARITY, 1024 * MAP_GRANULARITY)
        .with_worker_backoff(Duration::from_secs(60), Duration::from_secs(60));
    let mut store = TileDataStore::new(config).unwrap();
    let handle = store.handle().clone();
    let tiles: Arc<Vec<_>> = Arc::new(
        (0..4u8)
            .map(|i| handle.create_filled(&[i, 0x77]).unwrap())
            .collect(),
    );
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let tiles = Arc::clone(&tiles);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut reads = 0usize;
                while !done.load(Ordering::Acquire) {
                    for (i, tile) in tiles.iter().enumerate() {
                        let pixels = tile.read().unwrap();
                        assert!(pixels.chunks_exact(2).all(|px| px == [i as u8, 0x77]));
                        reads += 1;
                    }
                }
                reads
            })
        })
        .collect();

    let mut evicted = 0;
    for _ in 0..500 {
        evicted += handle.force_swap_out_all().unwrap();
        thread::yield_now();
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    assert!(evicted > 0);

    drop(tiles);
    assert_eq!(handle.stats().live_tile_data, 0);
    store.shutdown().unwrap();
}

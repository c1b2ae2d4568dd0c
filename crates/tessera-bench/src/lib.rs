//! Benchmark profiles for the Tessera tile store.
//!
//! - [`BenchStore`]: a store with a private swap directory and idle
//!   background workers, so each benchmark drives the pooler and swapper
//!   passes itself
//! - [`pooled_config`] / [`unpooled_config`]: with and without prepared
//!   clones for copy-on-write
//! - [`checkerboard`]: a grid with every other tile written

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tessera_core::{Rect, StoreConfig, MAP_GRANULARITY, TILE_HEIGHT, TILE_WIDTH};
use tessera_store::{StoreHandle, TileDataStore};
use tessera_tiles::TiledDataManager;

/// Base profile: generous limits, workers that never wake on their own.
pub fn bench_config(swap_dir: &Path) -> StoreConfig {
    StoreConfig::default()
        .with_swap_dir(swap_dir)
        .with_swap_sizes(16 * MAP_GRANULARITY, 64 * MAP_GRANULARITY, 1 << 34)
        .with_worker_backoff(Duration::from_secs(3600), Duration::from_secs(3600))
}

/// Copy-on-write served from clones prepared by the pooler.
pub fn pooled_config(swap_dir: &Path) -> StoreConfig {
    let mut config = bench_config(swap_dir);
    config.max_clones = 4;
    config
}

/// Every copy-on-write allocates and copies on the writing thread.
pub fn unpooled_config(swap_dir: &Path) -> StoreConfig {
    let mut config = bench_config(swap_dir);
    config.max_clones = 0;
    config
}

/// A store and the directory holding its swap file.
pub struct BenchStore {
    store: TileDataStore,
    _dir: TempDir,
}

impl BenchStore {
    /// Build a store from `profile`, one of the config functions above.
    pub fn new(profile: fn(&Path) -> StoreConfig) -> Self {
        let dir = tempfile::tempdir().expect("bench swap dir");
        let store = TileDataStore::new(profile(dir.path())).expect("bench store");
        Self { store, _dir: dir }
    }

    /// The store's handle.
    pub fn handle(&self) -> &StoreHandle {
        self.store.handle()
    }
}

/// A grid of `cols` x `rows` tiles where tiles with an even `col + row`
/// are filled with `pixel` and the others are left empty.
pub fn checkerboard(store: &StoreHandle, cols: i32, rows: i32, pixel: &[u8]) -> TiledDataManager {
    let dm = TiledDataManager::new(store, &vec![0; pixel.len()]).expect("bench grid");
    for row in 0..rows {
        for col in 0..cols {
            if (col + row) % 2 == 0 {
                let rect = Rect::new(col * TILE_WIDTH, row * TILE_HEIGHT, TILE_WIDTH, TILE_HEIGHT);
                dm.clear(rect, pixel).expect("bench fill");
            }
        }
    }
    dm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_validate() {
        let dir = tempfile::tempdir().unwrap();
        for profile in [bench_config, pooled_config, unpooled_config] {
            profile(dir.path()).validate().unwrap();
        }
    }

    #[test]
    fn checkerboard_fills_half_the_tiles() {
        let store = BenchStore::new(bench_config);
        let dm = checkerboard(store.handle(), 4, 3, &[1, 2]);
        assert_eq!(dm.tile_count(), 6);
        assert_eq!(dm.pixel(0, 0).unwrap(), vec![1, 2]);
        assert_eq!(dm.pixel(TILE_WIDTH, 0).unwrap(), vec![0, 0]);
        assert_eq!(dm.extent(), Rect::new(0, 0, 4 * TILE_WIDTH, 3 * TILE_HEIGHT));
    }
}

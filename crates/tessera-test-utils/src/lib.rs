//! Test fixtures and pixel helpers for Tessera development.
//!
//! [`TestStore`] builds a tile-data store whose swap file lives in a
//! private temporary directory and whose background workers only run when
//! kicked, so tests control every pass. The free functions check pixel
//! buffers read back from grids.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::time::Duration;

use tempfile::TempDir;
use tessera_core::{Rect, StoreConfig, MAP_GRANULARITY};
use tessera_store::{ShutdownReport, StoreHandle, TileDataStore};

/// Bytes of one tile with 1-byte pixels.
pub const TILE_SIZE: usize = tessera_core::TILE_PIXELS;

/// A store configuration for tests: small swap slabs, idle workers.
pub fn test_config(swap_dir: &std::path::Path) -> StoreConfig {
    StoreConfig::default()
        .with_swap_dir(swap_dir)
        .with_swap_sizes(MAP_GRANULARITY, 4 * MAP_GRANULARITY, 4096 * MAP_GRANULARITY)
        .with_worker_backoff(Duration::from_secs(30), Duration::from_secs(60))
}

/// A store with its swap directory.
///
/// Dropping it shuts the store down; leaked buffers are logged.
pub struct TestStore {
    store: TileDataStore,
    _dir: TempDir,
}

impl TestStore {
    pub fn new() -> Self {
        Self::with_config(|c| c)
    }

    /// A store whose soft and hard limits are `soft_tiles` and
    /// `hard_tiles` tiles of `pixel_size`-byte pixels.
    pub fn with_tile_limits(pixel_size: usize, soft_tiles: usize, hard_tiles: usize) -> Self {
        let tile = pixel_size * TILE_SIZE;
        Self::with_config(|c| c.with_memory_limits(soft_tiles * tile, hard_tiles * tile))
    }

    pub fn with_config(adjust: impl FnOnce(StoreConfig) -> StoreConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = TileDataStore::new(adjust(test_config(dir.path()))).unwrap();
        Self { store, _dir: dir }
    }

    pub fn handle(&self) -> &StoreHandle {
        self.store.handle()
    }

    pub fn shutdown(mut self) -> ShutdownReport {
        self.store.shutdown().unwrap()
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether every byte of `data` equals `pixel`.
pub fn memory_is_filled(pixel: u8, data: &[u8]) -> bool {
    data.iter().all(|&b| b == pixel)
}

/// Check a 1-byte-per-pixel buffer covering `area` row by row: pixels
/// inside `hole` must be `hole_pixel`, all others `background`.
///
/// Prints the first mismatch.
pub fn check_hole(buffer: &[u8], hole_pixel: u8, hole: Rect, background: u8, area: Rect) -> bool {
    let mut i = 0;
    for y in area.top()..area.bottom() {
        for x in area.left()..area.right() {
            let expected = if hole.contains_point(x, y) {
                hole_pixel
            } else {
                background
            };
            match buffer.get(i) {
                Some(&found) if found == expected => {}
                found => {
                    eprintln!("pixel ({x}, {y}): expected {expected}, found {found:?}");
                    return false;
                }
            }
            i += 1;
        }
    }
    true
}

/// A deterministic pixel of `pixel_size` bytes for position `(x, y)`.
pub fn pattern_pixel(x: i32, y: i32, pixel_size: usize) -> Vec<u8> {
    (0..pixel_size)
        .map(|c| (x.wrapping_mul(31) ^ y.wrapping_mul(17)).wrapping_add(c as i32) as u8)
        .collect()
}

/// A row-major buffer of [`pattern_pixel`]s covering `rect`.
pub fn pattern_buffer(rect: Rect, pixel_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(rect.area() * pixel_size);
    for y in rect.top()..rect.bottom() {
        for x in rect.left()..rect.right() {
            out.extend(pattern_pixel(x, y, pixel_size));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_hole_detects_mismatch() {
        let area = Rect::new(0, 0, 4, 2);
        let hole = Rect::new(1, 0, 2, 1);
        let good = [0, 9, 9, 0, 0, 0, 0, 0];
        assert!(check_hole(&good, 9, hole, 0, area));
        let bad = [0, 9, 0, 0, 0, 0, 0, 0];
        assert!(!check_hole(&bad, 9, hole, 0, area));
        assert!(!check_hole(&good[..4], 9, hole, 0, area));
    }

    #[test]
    fn pattern_buffer_matches_pixels() {
        let rect = Rect::new(-2, 3, 3, 2);
        let buf = pattern_buffer(rect, 2);
        assert_eq!(buf.len(), 12);
        assert_eq!(&buf[..2], &pattern_pixel(-2, 3, 2)[..]);
        assert_eq!(&buf[10..], &pattern_pixel(0, 4, 2)[..]);
    }

    #[test]
    fn test_store_shuts_down_cleanly() {
        let store = TestStore::new();
        let data = store.handle().create_filled(&[7]).unwrap();
        drop(data);
        assert_eq!(store.shutdown().workers_joined, 2);
    }
}

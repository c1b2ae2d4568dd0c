//! Extent tracking from per-row and per-column tile counts.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tessera_core::{Rect, TileCoord};

#[derive(Default)]
struct Counts {
    cols: BTreeMap<i32, usize>,
    rows: BTreeMap<i32, usize>,
}

impl Counts {
    fn add(&mut self, coord: TileCoord) {
        *self.cols.entry(coord.col).or_default() += 1;
        *self.rows.entry(coord.row).or_default() += 1;
    }

    fn remove(&mut self, coord: TileCoord) {
        let ok = decrement(&mut self.cols, coord.col) & decrement(&mut self.rows, coord.row);
        if !ok {
            tracing::error!(%coord, "extent notified of a tile it never saw");
            debug_assert!(false, "extent notified of a tile it never saw");
        }
    }

    fn extent(&self) -> Rect {
        let cols = self.cols.keys().next().zip(self.cols.keys().next_back());
        let rows = self.rows.keys().next().zip(self.rows.keys().next_back());
        match (cols, rows) {
            (Some((&c0, &c1)), Some((&r0, &r1))) => {
                Rect::from_tile_span(TileCoord::new(c0, r0), TileCoord::new(c1, r1))
            }
            _ => Rect::empty(),
        }
    }
}

fn decrement(map: &mut BTreeMap<i32, usize>, key: i32) -> bool {
    match map.get_mut(&key) {
        Some(n) if *n > 1 => {
            *n -= 1;
            true
        }
        Some(_) => {
            map.remove(&key);
            true
        }
        None => false,
    }
}

/// Tracks the bounding rectangle of a grid's tiles.
///
/// Tile insertions and removals are reported by the grid; the extent is
/// the tile-aligned box spanned by every row and column that still holds
/// at least one tile.
#[derive(Default)]
pub struct ExtentManager {
    counts: RwLock<Counts>,
}

impl ExtentManager {
    /// No tiles.
    pub fn new() -> Self {
        Self::default()
    }

    /// A tile was created at `coord`.
    pub fn notify_tile_added(&self, coord: TileCoord) {
        self.counts.write().add(coord);
    }

    /// The tile at `coord` was removed.
    pub fn notify_tile_removed(&self, coord: TileCoord) {
        self.counts.write().remove(coord);
    }

    /// Rebuild the counts from a full list of tile positions.
    pub fn replace_tile_stats(&self, coords: impl IntoIterator<Item = TileCoord>) {
        let mut counts = Counts::default();
        for coord in coords {
            counts.add(coord);
        }
        *self.counts.write() = counts;
    }

    /// Forget every tile.
    pub fn clear(&self) {
        *self.counts.write() = Counts::default();
    }

    /// Tile-aligned bounding rectangle, empty without tiles.
    pub fn extent(&self) -> Rect {
        self.counts.read().extent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_follows_adds_and_removes() {
        let em = ExtentManager::new();
        assert!(em.extent().is_empty());
        em.notify_tile_added(TileCoord::new(0, 0));
        em.notify_tile_added(TileCoord::new(2, -1));
        assert_eq!(em.extent(), Rect::new(0, -64, 192, 128));
        em.notify_tile_removed(TileCoord::new(2, -1));
        assert_eq!(em.extent(), Rect::new(0, 0, 64, 64));
        em.notify_tile_removed(TileCoord::new(0, 0));
        assert!(em.extent().is_empty());
    }

    #[test]
    fn shared_rows_keep_extent() {
        let em = ExtentManager::new();
        em.notify_tile_added(TileCoord::new(0, 0));
        em.notify_tile_added(TileCoord::new(3, 0));
        em.notify_tile_removed(TileCoord::new(0, 0));
        assert_eq!(em.extent(), Rect::new(192, 0, 64, 64));
    }

    #[test]
    fn replace_rebuilds_counts() {
        let em = ExtentManager::new();
        em.notify_tile_added(TileCoord::new(9, 9));
        em.replace_tile_stats([TileCoord::new(1, 1), TileCoord::new(1, 2)]);
        assert_eq!(em.extent(), Rect::new(64, 64, 64, 128));
        em.clear();
        assert!(em.extent().is_empty());
    }
}

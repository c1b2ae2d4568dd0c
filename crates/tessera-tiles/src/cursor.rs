//! Small most-recently-used cache of locked tiles for pixel iterators.
//!
//! Each entry keeps the current version of one tile locked (shared or
//! exclusive) together with its old version, the state before the open
//! named transaction. When both are the same version only one lock is
//! taken. The front entry is the tile under the cursor.

use std::sync::Arc;

use smallvec::SmallVec;
use tessera_core::{StoreError, TileCoord};
use tessera_store::{TileData, TileDataReadGuard, TileDataWriteGuard};

use crate::data_manager::{offset_in_tile, TiledDataManager};

const CACHE_SIZE: usize = 4;

enum Access {
    Read(TileDataReadGuard),
    Write(TileDataWriteGuard),
}

impl Access {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::Read(guard) => guard,
            Self::Write(guard) => guard,
        }
    }

    fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            Self::Read(_) => None,
            Self::Write(guard) => Some(&mut **guard),
        }
    }

    fn tile_data(&self) -> &Arc<TileData> {
        match self {
            Self::Read(guard) => guard.tile_data(),
            Self::Write(guard) => guard.tile_data(),
        }
    }
}

struct CachedTile {
    coord: TileCoord,
    access: Access,
    /// `None` when the old version is the current one.
    old: Option<TileDataReadGuard>,
}

impl CachedTile {
    fn old_bytes(&self) -> &[u8] {
        match &self.old {
            Some(guard) => guard,
            None => self.access.bytes(),
        }
    }
}

pub(crate) struct TileCursor<'a> {
    dm: &'a TiledDataManager,
    writable: bool,
    cache: SmallVec<[CachedTile; CACHE_SIZE]>,
}

impl<'a> TileCursor<'a> {
    pub(crate) fn new(dm: &'a TiledDataManager, writable: bool) -> Self {
        Self {
            dm,
            writable,
            cache: SmallVec::new(),
        }
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.writable
    }

    /// Make `coord` the current tile, locking it if it is not cached.
    pub(crate) fn seek(&mut self, coord: TileCoord) -> Result<(), StoreError> {
        if self.cache.first().is_some_and(|e| e.coord == coord) {
            return Ok(());
        }
        if let Some(pos) = self.cache.iter().position(|e| e.coord == coord) {
            let entry = self.cache.remove(pos);
            self.cache.insert(0, entry);
            return Ok(());
        }
        if self.cache.len() == CACHE_SIZE {
            self.cache.pop();
        }
        let entry = self.lock(coord)?;
        self.cache.insert(0, entry);
        Ok(())
    }

    fn lock(&self, coord: TileCoord) -> Result<CachedTile, StoreError> {
        // The current version is locked first: a write lock may copy the
        // version, which decides whether the old one is distinct.
        let access = if self.writable {
            Access::Write(self.dm.writable_tile(coord).lock_for_write()?)
        } else {
            let (tile, _) = self.dm.get_read_only_tile_lazy(coord.col, coord.row);
            Access::Read(tile.lock_for_read()?)
        };
        let (old_tile, _) = self.dm.get_old_tile(coord.col, coord.row);
        let old_data = old_tile.tile_data();
        let old = if Arc::ptr_eq(&old_data, access.tile_data()) {
            None
        } else {
            Some(old_data.read()?)
        };
        Ok(CachedTile { coord, access, old })
    }

    /// `count` pixels of the current tile starting at pixel `(x, y)`.
    pub(crate) fn run(&self, x: i32, y: i32, count: usize) -> &[u8] {
        let (start, len) = self.span(x, y, count);
        match self.cache.first() {
            Some(entry) => &entry.access.bytes()[start..start + len],
            None => &[],
        }
    }

    /// Mutable pixels of the current tile, `None` for read-only cursors.
    pub(crate) fn run_mut(&mut self, x: i32, y: i32, count: usize) -> Option<&mut [u8]> {
        let (start, len) = self.span(x, y, count);
        let bytes = self.cache.first_mut()?.access.bytes_mut()?;
        Some(&mut bytes[start..start + len])
    }

    /// Pixels of the current tile's old version.
    pub(crate) fn old_run(&self, x: i32, y: i32, count: usize) -> &[u8] {
        let (start, len) = self.span(x, y, count);
        match self.cache.first() {
            Some(entry) => &entry.old_bytes()[start..start + len],
            None => &[],
        }
    }

    fn span(&self, x: i32, y: i32, count: usize) -> (usize, usize) {
        let pixel_size = self.dm.pixel_size();
        (offset_in_tile(x, y, pixel_size), count * pixel_size)
    }

    #[cfg(test)]
    fn cached(&self) -> Vec<TileCoord> {
        self.cache.iter().map(|e| e.coord).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::Rect;
    use tessera_test_utils::TestStore;

    #[test]
    fn cache_is_most_recent_first_and_bounded() {
        let store = TestStore::new();
        let dm = TiledDataManager::new(store.handle(), &[0]).unwrap();
        let mut cursor = TileCursor::new(&dm, false);
        for col in 0..5 {
            cursor.seek(TileCoord::new(col, 0)).unwrap();
        }
        assert_eq!(
            cursor.cached(),
            vec![
                TileCoord::new(4, 0),
                TileCoord::new(3, 0),
                TileCoord::new(2, 0),
                TileCoord::new(1, 0),
            ]
        );
        cursor.seek(TileCoord::new(2, 0)).unwrap();
        assert_eq!(cursor.cached()[0], TileCoord::new(2, 0));
        assert_eq!(cursor.cached().len(), 4);
    }

    #[test]
    fn old_bytes_follow_the_open_transaction() {
        let store = TestStore::new();
        let dm = TiledDataManager::new(store.handle(), &[0]).unwrap();
        dm.clear(Rect::new(0, 0, 64, 64), &[1]).unwrap();
        let _m = dm.get_memento();
        {
            let mut cursor = TileCursor::new(&dm, true);
            cursor.seek(TileCoord::new(0, 0)).unwrap();
            cursor.run_mut(0, 0, 1).unwrap()[0] = 9;
            assert_eq!(cursor.run(0, 0, 1), &[9]);
            assert_eq!(cursor.old_run(0, 0, 1), &[1]);
        }
        dm.commit();
        let mut cursor = TileCursor::new(&dm, false);
        cursor.seek(TileCoord::new(0, 0)).unwrap();
        assert!(cursor.run_mut(0, 0, 1).is_none());
        assert_eq!(cursor.old_run(0, 0, 1), &[9]);
    }
}

//! A single grid cell.
//!
//! A [`Tile`] owns one user of its current [`TileData`] version behind a
//! small mutex. Read locks go straight to the version; write locks first
//! copy the version if anybody else uses it, swap the copy in, and report
//! the change to the grid's history before any pixel is touched.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tessera_core::{Rect, StoreError, TileCoord};
use tessera_store::{TileData, TileDataHandle, TileDataReadGuard, TileDataWriteGuard};

use crate::memento::MementoManager;

/// One `64 x 64` block of a grid.
pub struct Tile {
    coord: TileCoord,
    data: Mutex<TileDataHandle>,
    memento: Option<Arc<MementoManager>>,
}

impl Tile {
    /// A tile sharing `data`, reporting copies to `memento` if given.
    pub(crate) fn new(
        coord: TileCoord,
        data: Arc<TileData>,
        memento: Option<Arc<MementoManager>>,
    ) -> Self {
        Self {
            coord,
            data: Mutex::new(TileDataHandle::new(data)),
            memento,
        }
    }

    /// A tile that belongs to no grid (read-only views and old versions).
    pub(crate) fn detached(coord: TileCoord, data: Arc<TileData>) -> Self {
        Self::new(coord, data, None)
    }

    /// Grid position of the tile.
    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    /// Tile column.
    pub fn col(&self) -> i32 {
        self.coord.col
    }

    /// Tile row.
    pub fn row(&self) -> i32 {
        self.coord.row
    }

    /// Pixel rectangle covered by the tile.
    pub fn extent(&self) -> Rect {
        self.coord.rect()
    }

    /// Whether writes to this tile are recorded in a grid's history.
    pub fn is_detached(&self) -> bool {
        self.memento.is_none()
    }

    /// The version currently held.
    pub fn tile_data(&self) -> Arc<TileData> {
        Arc::clone(self.data.lock().tile_data())
    }

    /// Lock the pixels for reading.
    pub fn lock_for_read(&self) -> Result<TileDataReadGuard, StoreError> {
        self.tile_data().read()
    }

    /// Lock the pixels for writing, copying a shared version first.
    ///
    /// Only the first write after the version became shared copies; later
    /// writes in the same session reuse the private copy.
    pub fn lock_for_write(&self) -> Result<TileDataWriteGuard, StoreError> {
        let data = {
            let mut handle = self.data.lock();
            if handle.tile_data().users_count() > 1 {
                let copy = handle.tile_data().duplicate()?;
                *handle = TileDataHandle::new(Arc::clone(&copy));
                if let Some(memento) = &self.memento {
                    memento.register_tile_change(self.coord, Arc::clone(&copy));
                }
                tracing::trace!(coord = %self.coord, id = %copy.id(), "copied on write");
            }
            Arc::clone(handle.tile_data())
        };
        data.write()
    }

    /// A new tile at `coord` sharing this tile's version.
    pub(crate) fn share_into(
        &self,
        coord: TileCoord,
        memento: Option<Arc<MementoManager>>,
    ) -> Tile {
        Tile::new(coord, self.tile_data(), memento)
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("coord", &self.coord)
            .field("data", self.data.lock().tile_data())
            .field("detached", &self.is_detached())
            .finish()
    }
}

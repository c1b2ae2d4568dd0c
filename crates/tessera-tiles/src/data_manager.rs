//! The grid façade: tiles, history, extent and pixel I/O in one place.
//!
//! [`TiledDataManager`] ties a [`TileHashTable`] to its [`MementoManager`]
//! and an [`ExtentManager`]. Every tile-level mutation goes through the
//! table so that history sees it; the extent manager is told about tiles
//! appearing and disappearing by the façade, and rebuilt from the table
//! after history replays.
//!
//! # Concurrency
//!
//! Point reads and writes, clears and blits may run concurrently as long
//! as their areas do not overlap. History operations (`get_memento`,
//! `commit`, `rollback`, `rollforward`, `purge_history`) are serialized
//! against each other by the façade; callers must not run them while
//! other threads edit the same grid.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tessera_core::{
    contiguous_columns, contiguous_rows, Rect, StoreError, TileCoord, TILE_HEIGHT, TILE_WIDTH,
};
use tessera_store::{StoreHandle, TileData};

use crate::extent::ExtentManager;
use crate::hash_table::TileHashTable;
use crate::memento::{Memento, MementoManager, Replayed};
use crate::tile::Tile;

/// Byte offset of pixel `(x, y)` inside its tile.
pub(crate) fn offset_in_tile(x: i32, y: i32, pixel_size: usize) -> usize {
    let col = x.rem_euclid(TILE_WIDTH) as usize;
    let row = y.rem_euclid(TILE_HEIGHT) as usize;
    (row * TILE_WIDTH as usize + col) * pixel_size
}

/// A sparse, versioned grid of `pixel_size`-byte pixels.
pub struct TiledDataManager {
    store: StoreHandle,
    pixel_size: usize,
    default_pixel: RwLock<Box<[u8]>>,
    table: TileHashTable,
    extent: ExtentManager,
    history: Mutex<()>,
}

impl TiledDataManager {
    /// An empty grid whose every pixel reads as `default_pixel`.
    pub fn new(store: &StoreHandle, default_pixel: &[u8]) -> Result<Self, StoreError> {
        let default_data = store.create_filled(default_pixel)?;
        let memento = Arc::new(MementoManager::new(
            store.clone(),
            Arc::clone(&default_data),
        ));
        Ok(Self {
            store: store.clone(),
            pixel_size: default_pixel.len(),
            default_pixel: RwLock::new(default_pixel.into()),
            table: TileHashTable::new(default_data, memento),
            extent: ExtentManager::new(),
            history: Mutex::new(()),
        })
    }

    /// A grid with the same content whose tiles share every version of
    /// this one. History is not carried over.
    pub fn duplicate(&self) -> Self {
        let default_data = self.table.default_tile_data();
        let memento = Arc::new(MementoManager::new(self.store.clone(), default_data));
        let copy = Self {
            store: self.store.clone(),
            pixel_size: self.pixel_size,
            default_pixel: RwLock::new(self.default_pixel.read().clone()),
            table: self.table.duplicate_for(memento),
            extent: ExtentManager::new(),
            history: Mutex::new(()),
        };
        copy.recalculate_extent();
        copy
    }

    /// The store backing this grid.
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Bytes per pixel.
    pub fn pixel_size(&self) -> usize {
        self.pixel_size
    }

    /// The pixel that cells without a tile read as.
    pub fn default_pixel(&self) -> Box<[u8]> {
        self.default_pixel.read().clone()
    }

    /// Change the default pixel.
    ///
    /// Inside a named transaction the change is recorded in its memento,
    /// so rolling the transaction back restores the previous default.
    pub fn set_default_pixel(&self, pixel: &[u8]) -> Result<(), StoreError> {
        self.check_pixel(pixel)?;
        let data = self.store.create_filled(pixel)?;
        let mut current = self.default_pixel.write();
        if let Some(memento) = self.table.memento_manager().current_memento() {
            memento.record_default_pixel(&current, pixel);
        }
        self.install_default(data);
        *current = pixel.into();
        Ok(())
    }

    fn install_default(&self, data: Arc<TileData>) {
        self.table.set_default_tile_data(Arc::clone(&data));
        self.table.memento_manager().set_default_tile_data(data);
    }

    fn restore_default_pixel(&self, pixel: &[u8]) -> Result<(), StoreError> {
        let data = self.store.create_filled(pixel)?;
        let mut current = self.default_pixel.write();
        self.install_default(data);
        *current = pixel.into();
        Ok(())
    }

    fn check_pixel(&self, pixel: &[u8]) -> Result<(), StoreError> {
        if pixel.len() != self.pixel_size {
            return Err(StoreError::PixelSizeMismatch {
                expected: self.pixel_size,
                actual: pixel.len(),
            });
        }
        Ok(())
    }

    // ── tile access ─────────────────────────────────────────────

    /// The tile at `(col, row)`.
    ///
    /// A writable request creates the tile if it is missing. A read-only
    /// request never inserts; it returns a detached tile on the default
    /// data for empty cells.
    pub fn get_tile(&self, col: i32, row: i32, writable: bool) -> Arc<Tile> {
        let coord = TileCoord::new(col, row);
        if writable {
            self.writable_tile(coord)
        } else {
            self.table.get_read_only_tile_lazy(coord).0
        }
    }

    /// The tile at `(col, row)` and whether it exists in the grid.
    pub fn get_read_only_tile_lazy(&self, col: i32, row: i32) -> (Arc<Tile>, bool) {
        self.table.get_read_only_tile_lazy(TileCoord::new(col, row))
    }

    /// The tile at `(col, row)` as it was when the open named transaction
    /// started, and whether that version is a real tile.
    ///
    /// Outside a named transaction this is the current tile.
    pub fn get_old_tile(&self, col: i32, row: i32) -> (Arc<Tile>, bool) {
        let coord = TileCoord::new(col, row);
        match self.table.memento_manager().get_committed_tile(coord) {
            Some((tile, exists)) => (Arc::new(tile), exists),
            None => self.table.get_read_only_tile_lazy(coord),
        }
    }

    /// Whether a tile exists at `(col, row)`.
    pub fn tile_exists(&self, col: i32, row: i32) -> bool {
        self.table.tile_exists(TileCoord::new(col, row))
    }

    /// Snapshot of every tile, in no particular order.
    pub fn tiles(&self) -> Vec<Arc<Tile>> {
        self.table.tiles()
    }

    /// Number of tiles in the grid.
    pub fn tile_count(&self) -> usize {
        self.table.len()
    }

    pub(crate) fn writable_tile(&self, coord: TileCoord) -> Arc<Tile> {
        let (tile, created) = self.table.get_tile_lazy(coord);
        if created {
            self.extent.notify_tile_added(coord);
        }
        tile
    }

    // ── history ─────────────────────────────────────────────────

    /// Open a named transaction; see [`MementoManager::get_memento`].
    pub fn get_memento(&self) -> Arc<Memento> {
        let _history = self.history.lock();
        self.table.memento_manager().get_memento()
    }

    /// Commit pending changes.
    pub fn commit(&self) {
        let _history = self.history.lock();
        self.table.memento_manager().commit();
    }

    /// Undo the newest revision, restoring its default pixel if it
    /// changed one.
    ///
    /// Returns `Ok(None)` when there is nothing to undo.
    pub fn rollback(&self) -> Result<Option<Replayed>, StoreError> {
        let _history = self.history.lock();
        let Some(replayed) = self.table.memento_manager().rollback(&self.table) else {
            return Ok(None);
        };
        if let Some((old, _)) = replayed
            .memento
            .as_ref()
            .and_then(|m| m.default_pixel_change())
        {
            self.restore_default_pixel(&old)?;
        }
        self.recalculate_extent();
        tracing::debug!(cells = replayed.touched.len(), "rolled back");
        Ok(Some(replayed))
    }

    /// Redo the most recently undone revision.
    ///
    /// Returns `Ok(None)` when there is nothing to redo, including when
    /// edits made since the undo discarded the redo stack.
    pub fn rollforward(&self) -> Result<Option<Replayed>, StoreError> {
        let _history = self.history.lock();
        let Some(replayed) = self.table.memento_manager().rollforward(&self.table) else {
            return Ok(None);
        };
        if let Some((_, new)) = replayed
            .memento
            .as_ref()
            .and_then(|m| m.default_pixel_change())
        {
            self.restore_default_pixel(&new)?;
        }
        self.recalculate_extent();
        tracing::debug!(cells = replayed.touched.len(), "rolled forward");
        Ok(Some(replayed))
    }

    /// Forget history up to and including `memento`.
    pub fn purge_history(&self, memento: &Arc<Memento>) {
        let _history = self.history.lock();
        self.table.memento_manager().purge_history(memento);
    }

    /// Whether a named transaction is open.
    pub fn has_current_memento(&self) -> bool {
        self.table.memento_manager().has_current_memento()
    }

    /// The history of this grid.
    pub fn memento_manager(&self) -> &Arc<MementoManager> {
        self.table.memento_manager()
    }

    // ── editing ─────────────────────────────────────────────────

    /// Fill `rect` with `pixel`.
    ///
    /// Whole tiles are replaced by one shared filled version; clearing to
    /// the default pixel removes whole tiles instead and never grows the
    /// grid.
    pub fn clear(&self, rect: Rect, pixel: &[u8]) -> Result<(), StoreError> {
        self.check_pixel(pixel)?;
        let is_default = **self.default_pixel.read() == *pixel;
        let rect = if is_default {
            rect.intersected(&self.extent())
        } else {
            rect
        };
        if rect.is_empty() {
            return Ok(());
        }
        let filled = if !is_default && rect.width >= TILE_WIDTH && rect.height >= TILE_HEIGHT {
            Some(self.store.create_filled(pixel)?)
        } else {
            None
        };
        let run = pixel.repeat(rect.width.min(TILE_WIDTH) as usize);
        for coord in rect.tiles() {
            let tile_rect = coord.rect();
            let part = rect.intersected(&tile_rect);
            if part == tile_rect {
                if self.table.delete_tile(coord) {
                    self.extent.notify_tile_removed(coord);
                }
                if let Some(data) = &filled {
                    self.add_shared(coord, Arc::clone(data));
                }
            } else {
                let line = part.width as usize * self.pixel_size;
                let tile = self.writable_tile(coord);
                let mut pixels = tile.lock_for_write()?;
                for y in part.top()..part.bottom() {
                    let start = offset_in_tile(part.left(), y, self.pixel_size);
                    pixels[start..start + line].copy_from_slice(&run[..line]);
                }
            }
        }
        Ok(())
    }

    /// Remove every tile.
    pub fn clear_all(&self) {
        self.table.clear();
        self.extent.clear();
    }

    /// Remove tiles intersecting `rect` whose pixels all equal the
    /// default pixel.
    pub fn purge(&self, rect: Rect) -> Result<(), StoreError> {
        let default = self.table.default_tile_data().read()?;
        let mut doomed = Vec::new();
        for tile in self.table.tiles() {
            if !tile.extent().intersects(&rect) {
                continue;
            }
            let pixels = tile.lock_for_read()?;
            if *pixels == *default {
                doomed.push(tile.coord());
            }
        }
        drop(default);
        for coord in &doomed {
            if self.table.delete_tile(*coord) {
                self.extent.notify_tile_removed(*coord);
            }
        }
        tracing::trace!(tiles = doomed.len(), "purged default tiles");
        Ok(())
    }

    /// Shrink the grid to `rect`.
    ///
    /// Tiles outside are removed, tiles straddling the border get their
    /// outside pixels reset to the default. A `rect` that already holds
    /// the extent changes nothing; growing happens on demand.
    pub fn set_extent(&self, rect: Rect) -> Result<(), StoreError> {
        if rect.contains(&self.extent()) {
            return Ok(());
        }
        let default = self.default_pixel();
        let ps = self.pixel_size;
        for tile in self.table.tiles() {
            let tile_rect = tile.extent();
            if rect.contains(&tile_rect) {
                continue;
            }
            if rect.intersects(&tile_rect) {
                let keep = rect.intersected(&tile_rect);
                let mut pixels = tile.lock_for_write()?;
                for y in tile_rect.top()..tile_rect.bottom() {
                    for x in tile_rect.left()..tile_rect.right() {
                        if !keep.contains_point(x, y) {
                            let start = offset_in_tile(x, y, ps);
                            pixels[start..start + ps].copy_from_slice(&default);
                        }
                    }
                }
            } else if self.table.delete_tile(tile.coord()) {
                self.extent.notify_tile_removed(tile.coord());
            }
        }
        Ok(())
    }

    /// Copy `rect` from `src`, sharing whole tiles instead of copying them.
    pub fn bit_blt(&self, src: &TiledDataManager, rect: Rect) -> Result<(), StoreError> {
        self.blit(src, rect, BlitSource::Current, false)
    }

    /// Like [`bit_blt`](Self::bit_blt), reading `src` as it was before its
    /// open named transaction.
    pub fn bit_blt_old_data(&self, src: &TiledDataManager, rect: Rect) -> Result<(), StoreError> {
        self.blit(src, rect, BlitSource::Old, false)
    }

    /// Share every tile touched by `rect` from `src`, ignoring the exact
    /// border.
    pub fn bit_blt_rough(&self, src: &TiledDataManager, rect: Rect) -> Result<(), StoreError> {
        self.blit(src, rect, BlitSource::Current, true)
    }

    /// Like [`bit_blt_rough`](Self::bit_blt_rough) on `src`'s old data.
    pub fn bit_blt_rough_old_data(
        &self,
        src: &TiledDataManager,
        rect: Rect,
    ) -> Result<(), StoreError> {
        self.blit(src, rect, BlitSource::Old, true)
    }

    fn blit(
        &self,
        src: &TiledDataManager,
        rect: Rect,
        source: BlitSource,
        rough: bool,
    ) -> Result<(), StoreError> {
        if rect.is_empty() {
            return Ok(());
        }
        if src.pixel_size != self.pixel_size {
            return Err(StoreError::PixelSizeMismatch {
                expected: self.pixel_size,
                actual: src.pixel_size,
            });
        }
        let defaults_coincide = src.default_pixel() == self.default_pixel();
        let ps = self.pixel_size;
        for coord in rect.tiles() {
            let (src_tile, src_exists) = match source {
                BlitSource::Current => src.get_read_only_tile_lazy(coord.col, coord.row),
                BlitSource::Old => src.get_old_tile(coord.col, coord.row),
            };
            let tile_rect = coord.rect();
            let part = rect.intersected(&tile_rect);
            if rough || part == tile_rect {
                let was_deleted = self.table.delete_tile(coord);
                if src_exists || !defaults_coincide {
                    self.table.add_tile(
                        src_tile.share_into(coord, Some(Arc::clone(self.memento_manager()))),
                    );
                    if !was_deleted {
                        self.extent.notify_tile_added(coord);
                    }
                } else if was_deleted {
                    self.extent.notify_tile_removed(coord);
                }
            } else {
                // Rows go through a scratch buffer so the source lock is
                // gone before the destination is locked; both may be the
                // same version.
                let line = part.width as usize * ps;
                let mut rows = Vec::with_capacity(line * part.height as usize);
                {
                    let pixels = src_tile.lock_for_read()?;
                    for y in part.top()..part.bottom() {
                        let start = offset_in_tile(part.left(), y, ps);
                        rows.extend_from_slice(&pixels[start..start + line]);
                    }
                }
                let tile = self.writable_tile(coord);
                let mut pixels = tile.lock_for_write()?;
                for (y, row) in (part.top()..part.bottom()).zip(rows.chunks_exact(line)) {
                    let start = offset_in_tile(part.left(), y, ps);
                    pixels[start..start + line].copy_from_slice(row);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn add_shared(&self, coord: TileCoord, data: Arc<TileData>) {
        self.table.add_tile(Tile::new(
            coord,
            data,
            Some(Arc::clone(self.memento_manager())),
        ));
        self.extent.notify_tile_added(coord);
    }

    // ── pixel I/O ───────────────────────────────────────────────

    /// The bytes of pixel `(x, y)`.
    pub fn pixel(&self, x: i32, y: i32) -> Result<Vec<u8>, StoreError> {
        let (tile, _) = self.table.get_read_only_tile_lazy(TileCoord::containing(x, y));
        let pixels = tile.lock_for_read()?;
        let start = offset_in_tile(x, y, self.pixel_size);
        Ok(pixels[start..start + self.pixel_size].to_vec())
    }

    /// Overwrite pixel `(x, y)`.
    pub fn set_pixel(&self, x: i32, y: i32, pixel: &[u8]) -> Result<(), StoreError> {
        self.check_pixel(pixel)?;
        let tile = self.writable_tile(TileCoord::containing(x, y));
        let mut pixels = tile.lock_for_write()?;
        let start = offset_in_tile(x, y, self.pixel_size);
        pixels[start..start + self.pixel_size].copy_from_slice(pixel);
        Ok(())
    }

    /// Copy `rect` into `out`, rows packed back to back.
    pub fn read_bytes(&self, rect: Rect, out: &mut [u8]) -> Result<(), StoreError> {
        self.read_bytes_with_stride(rect, out, rect.width.max(0) as usize * self.pixel_size)
    }

    /// Copy `rect` into `out`, rows `row_stride` bytes apart.
    pub fn read_bytes_with_stride(
        &self,
        rect: Rect,
        out: &mut [u8],
        row_stride: usize,
    ) -> Result<(), StoreError> {
        self.check_buffer(rect, out.len(), row_stride)?;
        let ps = self.pixel_size;
        for coord in rect.tiles() {
            let part = rect.intersected(&coord.rect());
            let (tile, _) = self.table.get_read_only_tile_lazy(coord);
            let pixels = tile.lock_for_read()?;
            let line = part.width as usize * ps;
            for y in part.top()..part.bottom() {
                let src = offset_in_tile(part.left(), y, ps);
                let dst = (y - rect.top()) as usize * row_stride
                    + (part.left() - rect.left()) as usize * ps;
                out[dst..dst + line].copy_from_slice(&pixels[src..src + line]);
            }
        }
        Ok(())
    }

    /// Copy packed rows from `data` into `rect`.
    pub fn write_bytes(&self, rect: Rect, data: &[u8]) -> Result<(), StoreError> {
        self.write_bytes_with_stride(rect, data, rect.width.max(0) as usize * self.pixel_size)
    }

    /// Copy rows `row_stride` bytes apart from `data` into `rect`.
    pub fn write_bytes_with_stride(
        &self,
        rect: Rect,
        data: &[u8],
        row_stride: usize,
    ) -> Result<(), StoreError> {
        self.check_buffer(rect, data.len(), row_stride)?;
        let ps = self.pixel_size;
        for coord in rect.tiles() {
            let part = rect.intersected(&coord.rect());
            let tile = self.writable_tile(coord);
            let mut pixels = tile.lock_for_write()?;
            let line = part.width as usize * ps;
            for y in part.top()..part.bottom() {
                let dst = offset_in_tile(part.left(), y, ps);
                let src = (y - rect.top()) as usize * row_stride
                    + (part.left() - rect.left()) as usize * ps;
                pixels[dst..dst + line].copy_from_slice(&data[src..src + line]);
            }
        }
        Ok(())
    }

    fn check_buffer(&self, rect: Rect, len: usize, row_stride: usize) -> Result<(), StoreError> {
        if rect.is_empty() {
            return Ok(());
        }
        let line = rect.width as usize * self.pixel_size;
        let needed = row_stride.max(line) * (rect.height as usize - 1) + line;
        if row_stride < line || len < needed {
            return Err(StoreError::BufferTooSmall {
                needed,
                actual: len,
            });
        }
        Ok(())
    }

    /// Read `rect` split into one packed plane per channel.
    ///
    /// `channel_sizes` must add up to the pixel size.
    pub fn read_planar_bytes(
        &self,
        channel_sizes: &[usize],
        rect: Rect,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        self.check_channels(channel_sizes)?;
        let mut interleaved = vec![0u8; rect.area() * self.pixel_size];
        self.read_bytes(rect, &mut interleaved)?;
        let mut planes: Vec<Vec<u8>> = channel_sizes
            .iter()
            .map(|&size| Vec::with_capacity(rect.area() * size))
            .collect();
        for pixel in interleaved.chunks_exact(self.pixel_size) {
            let mut at = 0;
            for (plane, &size) in planes.iter_mut().zip(channel_sizes) {
                plane.extend_from_slice(&pixel[at..at + size]);
                at += size;
            }
        }
        Ok(planes)
    }

    /// Write one packed plane per channel into `rect`.
    ///
    /// A `None` plane leaves that channel as it is.
    pub fn write_planar_bytes(
        &self,
        planes: &[Option<&[u8]>],
        channel_sizes: &[usize],
        rect: Rect,
    ) -> Result<(), StoreError> {
        self.check_channels(channel_sizes)?;
        if planes.len() != channel_sizes.len() {
            return Err(StoreError::PixelSizeMismatch {
                expected: channel_sizes.len(),
                actual: planes.len(),
            });
        }
        let area = rect.area();
        for (plane, &size) in planes.iter().zip(channel_sizes) {
            if let Some(plane) = plane {
                if plane.len() < area * size {
                    return Err(StoreError::BufferTooSmall {
                        needed: area * size,
                        actual: plane.len(),
                    });
                }
            }
        }
        let mut interleaved = vec![0u8; area * self.pixel_size];
        if planes.iter().any(Option::is_none) {
            self.read_bytes(rect, &mut interleaved)?;
        }
        for (i, pixel) in interleaved.chunks_exact_mut(self.pixel_size).enumerate() {
            let mut at = 0;
            for (plane, &size) in planes.iter().zip(channel_sizes) {
                if let Some(plane) = plane {
                    pixel[at..at + size].copy_from_slice(&plane[i * size..(i + 1) * size]);
                }
                at += size;
            }
        }
        self.write_bytes(rect, &interleaved)
    }

    fn check_channels(&self, channel_sizes: &[usize]) -> Result<(), StoreError> {
        let total: usize = channel_sizes.iter().sum();
        if total != self.pixel_size {
            return Err(StoreError::PixelSizeMismatch {
                expected: self.pixel_size,
                actual: total,
            });
        }
        Ok(())
    }

    /// Pixels from column `x` to the right edge of its tile.
    pub fn num_contiguous_columns(&self, x: i32) -> i32 {
        contiguous_columns(x)
    }

    /// Pixels from row `y` to the bottom edge of its tile.
    pub fn num_contiguous_rows(&self, y: i32) -> i32 {
        contiguous_rows(y)
    }

    /// Bytes between vertically adjacent pixels inside one tile.
    pub fn row_stride(&self) -> usize {
        TILE_WIDTH as usize * self.pixel_size
    }

    // ── extent ──────────────────────────────────────────────────

    /// Tile-aligned bounding rectangle of every tile.
    pub fn extent(&self) -> Rect {
        self.extent.extent()
    }

    /// The rectangle of every tile, in no particular order.
    pub fn region(&self) -> Vec<Rect> {
        self.table.tiles().iter().map(|t| t.extent()).collect()
    }

    /// Rebuild the extent from the tiles present.
    pub fn recalculate_extent(&self) {
        self.extent
            .replace_tile_stats(self.table.tiles().iter().map(|t| t.coord()));
    }

    pub(crate) fn extent_manager(&self) -> &ExtentManager {
        &self.extent
    }
}

#[derive(Clone, Copy)]
enum BlitSource {
    Current,
    Old,
}

impl fmt::Debug for TiledDataManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiledDataManager")
            .field("pixel_size", &self.pixel_size)
            .field("tiles", &self.table.len())
            .field("extent", &self.extent())
            .field("history", self.memento_manager())
            .finish()
    }
}

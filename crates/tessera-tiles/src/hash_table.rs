//! Bucketed table of the tiles of one grid.
//!
//! 1024 buckets, each a singly linked chain of entries stored in a slab
//! and linked by index. One read-write lock covers the whole structure:
//! lookups share it, insertions and removals take it exclusively.
//!
//! Registering mutations ([`add_tile`](TileHashTable::add_tile),
//! [`delete_tile`](TileHashTable::delete_tile), lazy creation) report to
//! the grid's [`MementoManager`] while the table lock is held. The silent
//! variants are for history replay, which must not record itself.

use std::sync::Arc;

use parking_lot::RwLock;
use tessera_core::TileCoord;
use tessera_store::{TileData, TileDataHandle};

use crate::memento::MementoManager;
use crate::tile::Tile;

const BUCKETS: usize = 1024;

fn bucket_of(coord: TileCoord) -> usize {
    let row = coord.row as u32;
    let col = coord.col as u32;
    ((row << 5).wrapping_add(col & 0x1F) & 0x3FF) as usize
}

struct Entry {
    tile: Arc<Tile>,
    next: Option<usize>,
}

struct Table {
    buckets: Box<[Option<usize>]>,
    entries: Vec<Option<Entry>>,
    free: Vec<usize>,
    len: usize,
    default_data: TileDataHandle,
}

impl Table {
    fn find(&self, coord: TileCoord) -> Option<&Arc<Tile>> {
        let mut cursor = self.buckets[bucket_of(coord)];
        while let Some(i) = cursor {
            let entry = self.entries[i].as_ref()?;
            if entry.tile.coord() == coord {
                return Some(&entry.tile);
            }
            cursor = entry.next;
        }
        None
    }

    fn insert(&mut self, tile: Arc<Tile>) {
        let bucket = bucket_of(tile.coord());
        let entry = Entry {
            tile,
            next: self.buckets[bucket],
        };
        let index = match self.free.pop() {
            Some(i) => {
                self.entries[i] = Some(entry);
                i
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() - 1
            }
        };
        self.buckets[bucket] = Some(index);
        self.len += 1;
    }

    fn remove(&mut self, coord: TileCoord) -> Option<Arc<Tile>> {
        let bucket = bucket_of(coord);
        let mut prev: Option<usize> = None;
        let mut cursor = self.buckets[bucket];
        while let Some(i) = cursor {
            let (matches, next) = {
                let entry = self.entries[i].as_ref()?;
                (entry.tile.coord() == coord, entry.next)
            };
            if matches {
                match prev {
                    Some(p) => {
                        if let Some(prev_entry) = self.entries[p].as_mut() {
                            prev_entry.next = next;
                        }
                    }
                    None => self.buckets[bucket] = next,
                }
                let entry = self.entries[i].take()?;
                self.free.push(i);
                self.len -= 1;
                return Some(entry.tile);
            }
            prev = Some(i);
            cursor = next;
        }
        None
    }

    fn tiles(&self) -> Vec<Arc<Tile>> {
        self.entries
            .iter()
            .flatten()
            .map(|e| Arc::clone(&e.tile))
            .collect()
    }

    fn drain(&mut self) -> Vec<Arc<Tile>> {
        self.buckets.iter_mut().for_each(|b| *b = None);
        self.free.clear();
        self.len = 0;
        self.entries
            .drain(..)
            .flatten()
            .map(|e| e.tile)
            .collect()
    }
}

/// The tiles of one grid, keyed by tile coordinate.
pub struct TileHashTable {
    table: RwLock<Table>,
    memento: Arc<MementoManager>,
}

impl TileHashTable {
    /// An empty table whose missing cells read as `default_data`.
    pub fn new(default_data: Arc<TileData>, memento: Arc<MementoManager>) -> Self {
        Self {
            table: RwLock::new(Table {
                buckets: vec![None; BUCKETS].into_boxed_slice(),
                entries: Vec::new(),
                free: Vec::new(),
                len: 0,
                default_data: TileDataHandle::new(default_data),
            }),
            memento,
        }
    }

    /// A table holding new tiles that share every version of `self`.
    ///
    /// Nothing is recorded in `memento`.
    pub fn duplicate_for(&self, memento: Arc<MementoManager>) -> Self {
        let source = self.table.read();
        let copy = Self::new(
            Arc::clone(source.default_data.tile_data()),
            Arc::clone(&memento),
        );
        {
            let mut table = copy.table.write();
            for tile in source.tiles() {
                let shared = tile.share_into(tile.coord(), Some(Arc::clone(&memento)));
                table.insert(Arc::new(shared));
            }
        }
        copy
    }

    /// The history this table reports to.
    pub fn memento_manager(&self) -> &Arc<MementoManager> {
        &self.memento
    }

    /// The tile at `coord`, if one exists.
    pub fn get_existing_tile(&self, coord: TileCoord) -> Option<Arc<Tile>> {
        self.table.read().find(coord).cloned()
    }

    /// The tile at `coord`, created on the default data if missing.
    ///
    /// Returns the tile and whether it was created by this call.
    pub fn get_tile_lazy(&self, coord: TileCoord) -> (Arc<Tile>, bool) {
        if let Some(tile) = self.get_existing_tile(coord) {
            return (tile, false);
        }
        let mut table = self.table.write();
        if let Some(tile) = table.find(coord) {
            return (Arc::clone(tile), false);
        }
        let data = Arc::clone(table.default_data.tile_data());
        let tile = Arc::new(Tile::new(
            coord,
            Arc::clone(&data),
            Some(Arc::clone(&self.memento)),
        ));
        table.insert(Arc::clone(&tile));
        self.memento.register_tile_change(coord, data);
        (tile, true)
    }

    /// The tile at `coord`, or a detached tile on the default data.
    ///
    /// Returns the tile and whether it exists in the table. Never inserts.
    pub fn get_read_only_tile_lazy(&self, coord: TileCoord) -> (Arc<Tile>, bool) {
        let table = self.table.read();
        match table.find(coord) {
            Some(tile) => (Arc::clone(tile), true),
            None => {
                let data = Arc::clone(table.default_data.tile_data());
                (Arc::new(Tile::detached(coord, data)), false)
            }
        }
    }

    /// Insert `tile`, replacing any tile at its coordinate, and record
    /// the change.
    pub fn add_tile(&self, tile: Tile) {
        let coord = tile.coord();
        let data = tile.tile_data();
        let mut table = self.table.write();
        table.remove(coord);
        table.insert(Arc::new(tile));
        self.memento.register_tile_change(coord, data);
    }

    /// Remove the tile at `coord` and record the deletion.
    ///
    /// Returns whether a tile was removed.
    pub fn delete_tile(&self, coord: TileCoord) -> bool {
        let mut table = self.table.write();
        if table.remove(coord).is_none() {
            return false;
        }
        self.memento.register_tile_deleted(coord);
        true
    }

    /// Insert `tile` without recording anything.
    pub fn add_tile_silent(&self, tile: Tile) {
        let mut table = self.table.write();
        table.remove(tile.coord());
        table.insert(Arc::new(tile));
    }

    /// Remove the tile at `coord` without recording anything.
    pub fn delete_tile_silent(&self, coord: TileCoord) -> bool {
        self.table.write().remove(coord).is_some()
    }

    /// Whether a tile exists at `coord`.
    pub fn tile_exists(&self, coord: TileCoord) -> bool {
        self.table.read().find(coord).is_some()
    }

    /// Remove every tile, recording each deletion.
    pub fn clear(&self) {
        let removed = {
            let mut table = self.table.write();
            let removed = table.drain();
            for tile in &removed {
                self.memento.register_tile_deleted(tile.coord());
            }
            removed
        };
        tracing::trace!(tiles = removed.len(), "cleared tile table");
    }

    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.table.read().len
    }

    /// Whether the table holds no tiles.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every tile, in no particular order.
    pub fn tiles(&self) -> Vec<Arc<Tile>> {
        self.table.read().tiles()
    }

    /// Data that missing cells read as.
    pub fn default_tile_data(&self) -> Arc<TileData> {
        Arc::clone(self.table.read().default_data.tile_data())
    }

    /// Replace the default data. Existing tiles keep their versions.
    pub fn set_default_tile_data(&self, data: Arc<TileData>) {
        self.table.write().default_data = TileDataHandle::new(data);
    }
}

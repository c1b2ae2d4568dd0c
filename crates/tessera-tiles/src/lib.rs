//! Sparse tiled grids with copy-on-write tiles and undo history.
//!
//! # Architecture
//!
//! ```text
//! TiledDataManager (façade, one per grid)
//! ├── TileHashTable ── Tile ── TileDataHandle ─► TileData (tessera-store)
//! ├── MementoManager (index, revisions, redo stack, heads)
//! ├── ExtentManager  (per-row / per-column tile counts)
//! └── iterators ── TileCursor (four most recent tiles, locked)
//! ```
//!
//! A grid hands out [`Tile`]s. Read locks go straight to the tile's
//! current version; the first write lock on a shared version copies it
//! and reports the copy to the grid's [`MementoManager`]. Named
//! transactions ([`Memento`]s) group those reports into revisions that
//! can be rolled back and forward.
//!
//! All pixel memory comes from a [`tessera_store::TileDataStore`] passed
//! in at construction; several grids may share one store.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod cursor;
pub mod data_manager;
pub mod extent;
pub mod hash_table;
pub mod iterators;
pub mod memento;
pub mod persist;
pub mod random_accessor;
pub mod tile;

pub use data_manager::TiledDataManager;
pub use extent::ExtentManager;
pub use hash_table::TileHashTable;
pub use iterators::{HLineIterator, RectIterator, VLineIterator};
pub use memento::{Memento, MementoManager, Replayed};
pub use persist::FORMAT_VERSION;
pub use random_accessor::RandomAccessor;
pub use tile::Tile;

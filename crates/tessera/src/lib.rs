//! Tessera: copy-on-write, versioned, swappable tile storage for large
//! raster images.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Tessera sub-crates. For most users, adding `tessera` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use tessera::prelude::*;
//!
//! let mut store = TileDataStore::new(StoreConfig::default()).unwrap();
//! {
//!     // A grid of 4-byte pixels, transparent by default.
//!     let grid = TiledDataManager::new(store.handle(), &[0, 0, 0, 0]).unwrap();
//!
//!     let stroke = grid.get_memento();
//!     grid.clear(Rect::new(10, 10, 200, 100), &[255, 0, 0, 255]).unwrap();
//!     grid.commit();
//!     assert_eq!(grid.pixel(50, 50).unwrap(), vec![255, 0, 0, 255]);
//!     assert_eq!(grid.extent(), Rect::new(0, 0, 256, 128));
//!
//!     grid.rollback().unwrap();
//!     assert_eq!(grid.pixel(50, 50).unwrap(), vec![0, 0, 0, 0]);
//!     assert!(stroke.is_valid());
//! }
//! store.shutdown().unwrap();
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `tessera-core` | Geometry, configuration, errors, IDs, codec trait |
//! | [`codec`] | `tessera-codec` | Raw and LZ4 tile codecs |
//! | [`swap`] | `tessera-swap` | Swap file and chunk allocator |
//! | [`store`] | `tessera-store` | Tile data, memory pool, background workers |
//! | [`tiles`] | `tessera-tiles` | Tiled grids, undo history, iterators, persistence |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Geometry, configuration, errors and IDs (`tessera-core`).
///
/// Also defines the [`types::TileCodec`] trait implemented by [`codec`].
pub use tessera_core as types;

/// Tile codecs (`tessera-codec`).
pub use tessera_codec as codec;

/// Swap file and chunk allocator (`tessera-swap`).
///
/// Used by the store's swapper; applications rarely touch it directly.
pub use tessera_swap as swap;

/// Tile data, memory pool and background workers (`tessera-store`).
///
/// [`store::TileDataStore`] owns the workers; grids hold a
/// [`store::StoreHandle`].
pub use tessera_store as store;

/// Tiled grids (`tessera-tiles`).
///
/// [`tiles::TiledDataManager`] is the entry point: pixel I/O, clears,
/// blits, named transactions, iterators and persistence.
pub use tessera_tiles as tiles;

/// Common imports for typical Tessera usage.
///
/// ```rust
/// use tessera::prelude::*;
/// ```
pub mod prelude {
    // Geometry and configuration
    pub use tessera_core::{Rect, StoreConfig, TileCoord, TILE_HEIGHT, TILE_WIDTH};

    // Errors
    pub use tessera_core::{PersistError, StoreError};

    // Codecs
    pub use tessera_core::TileCodec;
    pub use tessera_codec::{default_codec, Lz4Codec, RawCodec};

    // Store
    pub use tessera_store::{StoreHandle, StoreStats, TileDataStore};

    // Grids
    pub use tessera_tiles::{
        HLineIterator, Memento, RandomAccessor, RectIterator, TiledDataManager, VLineIterator,
    };
}

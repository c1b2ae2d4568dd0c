//! Core types and traits for the Tessera tile store.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by every other Tessera crate: tile coordinates
//! and rectangles, strongly-typed identifiers, the store configuration,
//! error types, and the [`TileCodec`] capability used for swap and
//! persistence.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod error;
pub mod geometry;
pub mod id;

pub use codec::TileCodec;
pub use config::{StoreConfig, MAP_GRANULARITY};
pub use error::{CodecError, ConfigError, PersistError, StoreError, SwapError};
pub use geometry::{
    contiguous_columns, contiguous_rows, Rect, TileCoord, TILE_HEIGHT, TILE_PIXELS, TILE_WIDTH,
};
pub use id::{MementoId, TileDataId};

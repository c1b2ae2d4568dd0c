//! Copy-on-write pixel buffers with background pooling and swapping.
//!
//! # Architecture
//!
//! ```text
//! TileDataStore (owner, joins workers on shutdown)
//! ├── StoreHandle ─► StoreShared (Arc)
//! │   ├── PoolSet → MemoryPool per buffer size (lock-free slots)
//! │   ├── ClockList (weak refs to resident TileData, rotating hand)
//! │   ├── SwapFile (created on first eviction)
//! │   └── StoreCounters
//! ├── tessera-pooler thread  (prepares clones of shared buffers)
//! └── tessera-swapper thread (clock eviction above the soft limit)
//! ```
//!
//! A [`TileData`] is one version of a tile's pixels. Its users count,
//! maintained by [`TileDataHandle`], tells writers when a copy is needed.
//!
//! `unsafe` is confined to `raw.rs` and the slot handling in `pool.rs`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

mod clock;
pub mod pool;
mod pooler;
mod raw;
pub mod stats;
pub mod store;
mod swapper;
pub mod tile_data;
mod worker;

pub use pool::MemoryPool;
pub use stats::StoreStats;
pub use store::{ShutdownReport, StoreHandle, TileDataStore};
pub use tile_data::{
    TileData, TileDataHandle, TileDataReadGuard, TileDataState, TileDataWriteGuard,
};

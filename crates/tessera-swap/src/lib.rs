//! Swap storage for evicted tiles.
//!
//! ```text
//! SwapFile
//! ├── File (anonymous temp file, grown in slabs)
//! ├── ChunkAllocator (sorted [begin,end) ranges, rotating first-fit cursor)
//! ├── read SwapWindow  (mmap view, remapped on demand)
//! └── write SwapWindow (mmap view, remapped on demand)
//! ```
//!
//! The windows are the only `unsafe` code in this crate and live in
//! `window.rs`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod chunk;
pub mod swap_file;
mod window;

pub use chunk::{Chunk, ChunkAllocator};
pub use swap_file::SwapFile;

// Compile-time assertion: the swap file is shared between the swapper
// thread and every thread that swaps tiles back in.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<SwapFile>();
    assert::<ChunkAllocator>();
};

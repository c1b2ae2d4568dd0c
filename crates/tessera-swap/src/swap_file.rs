//! The swap file: an anonymous temporary file carved into chunks.

use std::fs::File;

use parking_lot::Mutex;
use tessera_core::{StoreConfig, SwapError};

use crate::chunk::{Chunk, ChunkAllocator};
use crate::window::SwapWindow;

/// Backing store for evicted tile payloads.
///
/// Lock order inside this type: the allocator lock is released before
/// either window lock is taken, and the two windows are never held
/// together. Readers and writers therefore only contend on the window
/// they use.
pub struct SwapFile {
    file: File,
    file_len: Mutex<u64>,
    allocator: ChunkAllocator,
    read_window: Mutex<SwapWindow>,
    write_window: Mutex<SwapWindow>,
}

impl SwapFile {
    /// Create an empty swap file in the configured directory.
    pub fn create(config: &StoreConfig) -> Result<Self, SwapError> {
        let file = match &config.swap_dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        tracing::debug!(dir = ?config.swap_dir, "created swap file");
        Ok(Self {
            file,
            file_len: Mutex::new(0),
            allocator: ChunkAllocator::new(config.swap_slab_size, config.max_swap_size),
            read_window: Mutex::new(SwapWindow::new(config.swap_window_size)),
            write_window: Mutex::new(SwapWindow::new(config.swap_window_size)),
        })
    }

    /// Store `payload` in a fresh chunk.
    pub fn write(&self, payload: &[u8]) -> Result<Chunk, SwapError> {
        let chunk = self.allocator.get_chunk(payload.len() as u64)?;
        match self.write_at(chunk, payload) {
            Ok(()) => Ok(chunk),
            Err(e) => {
                let _ = self.allocator.free_chunk(chunk);
                Err(e)
            }
        }
    }

    fn write_at(&self, chunk: Chunk, payload: &[u8]) -> Result<(), SwapError> {
        let file_len = self.ensure_len(self.allocator.store_size().max(chunk.end()))?;
        let mut window = self.write_window.lock();
        window.slice(&self.file, file_len, chunk)?.copy_from_slice(payload);
        Ok(())
    }

    /// Copy the contents of `chunk` into `out`, replacing its contents.
    pub fn read(&self, chunk: Chunk, out: &mut Vec<u8>) -> Result<(), SwapError> {
        if !self.allocator.contains(chunk) {
            return Err(SwapError::UnknownChunk {
                begin: chunk.begin(),
                end: chunk.end(),
            });
        }
        let file_len = *self.file_len.lock();
        let mut window = self.read_window.lock();
        let bytes = window.slice(&self.file, file_len, chunk)?;
        out.clear();
        out.extend_from_slice(bytes);
        Ok(())
    }

    /// Release `chunk` for reuse.
    pub fn free(&self, chunk: Chunk) -> Result<(), SwapError> {
        self.allocator.free_chunk(chunk)
    }

    /// The chunk allocator backing this file.
    pub fn allocator(&self) -> &ChunkAllocator {
        &self.allocator
    }

    /// Physical length of the file in bytes.
    pub fn file_len(&self) -> u64 {
        *self.file_len.lock()
    }

    /// Total remaps performed by the read and write windows.
    pub fn remaps(&self) -> u64 {
        self.read_window.lock().remaps() + self.write_window.lock().remaps()
    }

    /// Grow the file to at least `len` bytes; returns the new length.
    fn ensure_len(&self, len: u64) -> Result<u64, SwapError> {
        let mut file_len = self.file_len.lock();
        if *file_len < len {
            self.file.set_len(len)?;
            tracing::debug!(from = *file_len, to = len, "grew swap file");
            *file_len = len;
        }
        Ok(*file_len)
    }
}

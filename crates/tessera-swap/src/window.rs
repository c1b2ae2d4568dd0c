//! Memory-mapped views over a region of the swap file.
//!
//! A [`SwapWindow`] maps at most one region at a time. Requests inside the
//! mapped region are served directly; anything else drops the mapping and
//! maps a new region starting at the chunk (rounded down to
//! [`MAP_GRANULARITY`]). The caller guarantees the file is already long
//! enough to back the chunk.

#![allow(unsafe_code)]

use std::fs::File;

use memmap2::{MmapMut, MmapOptions};
use tessera_core::{SwapError, MAP_GRANULARITY};

use crate::chunk::Chunk;

struct Mapping {
    map: MmapMut,
    offset: u64,
    len: u64,
}

/// One remappable view of the swap file.
pub(crate) struct SwapWindow {
    mapping: Option<Mapping>,
    window_size: u64,
    remaps: u64,
}

impl SwapWindow {
    pub(crate) fn new(window_size: u64) -> Self {
        Self {
            mapping: None,
            window_size,
            remaps: 0,
        }
    }

    /// Number of times this window has been (re)mapped.
    pub(crate) fn remaps(&self) -> u64 {
        self.remaps
    }

    /// Borrow the bytes of `chunk`, remapping if it is outside the window.
    ///
    /// `file_len` is the current length of `file` and must be at least
    /// `chunk.end()`.
    pub(crate) fn slice(
        &mut self,
        file: &File,
        file_len: u64,
        chunk: Chunk,
    ) -> Result<&mut [u8], SwapError> {
        debug_assert!(chunk.end() <= file_len, "chunk {chunk:?} beyond file end {file_len}");
        let covered = self
            .mapping
            .as_ref()
            .is_some_and(|m| chunk.begin() >= m.offset && chunk.end() <= m.offset + m.len);
        if !covered {
            self.remap(file, file_len, chunk)?;
        }
        match self.mapping.as_mut() {
            Some(m) => {
                let start = (chunk.begin() - m.offset) as usize;
                let end = (chunk.end() - m.offset) as usize;
                Ok(&mut m.map[start..end])
            }
            None => Err(SwapError::UnknownChunk {
                begin: chunk.begin(),
                end: chunk.end(),
            }),
        }
    }

    fn remap(&mut self, file: &File, file_len: u64, chunk: Chunk) -> Result<(), SwapError> {
        // Drop the old view before creating the next one.
        self.mapping = None;
        let offset = chunk.begin() - chunk.begin() % MAP_GRANULARITY;
        let wanted = self.window_size.max(chunk.end() - offset);
        let len = wanted.min(file_len - offset);
        // SAFETY: the swap file is an anonymous temporary owned by this
        // process. Every mapped byte lies below `file_len`, and the file is
        // only ever grown, never truncated, while windows exist. Concurrent
        // writers touch disjoint chunks handed out by the allocator.
        let map = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(len as usize)
                .map_mut(file)?
        };
        tracing::debug!(offset, len, "remapped swap window");
        self.remaps += 1;
        self.mapping = Some(Mapping { map, offset, len });
        Ok(())
    }
}

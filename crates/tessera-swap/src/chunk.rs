//! First-fit allocator for byte ranges inside the swap file.
//!
//! [`ChunkAllocator`] keeps the allocated ranges in a vector sorted by
//! start offset. Searches begin at a rotating cursor (the most recently
//! allocated chunk) and wrap around, so consecutive allocations pack
//! towards the end of the file before holes behind the cursor are
//! revisited. When no gap fits, the chunk is appended after the last
//! allocation and the logical store size grows by whole slabs.

use parking_lot::Mutex;
use tessera_core::SwapError;

/// A `[begin, end)` byte range inside the swap file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Chunk {
    begin: u64,
    end: u64,
}

impl Chunk {
    /// Create a chunk covering `[begin, end)`.
    pub fn new(begin: u64, end: u64) -> Self {
        debug_assert!(begin < end, "empty chunk [{begin}, {end})");
        Self { begin, end }
    }

    /// First byte of the chunk.
    pub fn begin(&self) -> u64 {
        self.begin
    }

    /// One past the last byte of the chunk.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Length in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    /// Always false for chunks handed out by the allocator.
    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }

    fn overlaps(&self, other: &Chunk) -> bool {
        self.begin < other.end && other.begin < self.end
    }
}

struct ChunkList {
    /// Allocated ranges sorted by `begin`.
    chunks: Vec<Chunk>,
    /// Index of the chunk after which the next search starts.
    cursor: usize,
    /// Logical size of the swap store, a multiple of the slab size.
    store_size: u64,
}

impl ChunkList {
    /// Start offset of gap `g`, which precedes `chunks[g]` (or the end of
    /// the store when `g == chunks.len()`).
    fn gap_start(&self, g: usize) -> u64 {
        if g == 0 {
            0
        } else {
            self.chunks[g - 1].end
        }
    }

    fn gap_end(&self, g: usize) -> u64 {
        match self.chunks.get(g) {
            Some(next) => next.begin,
            None => self.store_size,
        }
    }

    fn find_gap(&self, size: u64) -> Option<usize> {
        let gaps = self.chunks.len() + 1;
        let start = if self.chunks.is_empty() {
            0
        } else {
            (self.cursor + 1) % gaps
        };
        (0..gaps)
            .map(|i| (start + i) % gaps)
            .find(|&g| self.gap_end(g).saturating_sub(self.gap_start(g)) >= size)
    }

    fn is_sane(&self) -> bool {
        let sorted = self
            .chunks
            .windows(2)
            .all(|w| w[0].end <= w[1].begin && !w[0].overlaps(&w[1]));
        let non_empty = self.chunks.iter().all(|c| !c.is_empty());
        let within = self.chunks.last().is_none_or(|c| c.end <= self.store_size);
        sorted && non_empty && within
    }
}

/// Allocator of non-overlapping ranges in a growable swap store.
pub struct ChunkAllocator {
    list: Mutex<ChunkList>,
    slab_size: u64,
    max_size: u64,
}

impl ChunkAllocator {
    /// Create an empty allocator growing in `slab_size` steps up to
    /// `max_size` bytes.
    pub fn new(slab_size: u64, max_size: u64) -> Self {
        Self {
            list: Mutex::new(ChunkList {
                chunks: Vec::new(),
                cursor: 0,
                store_size: 0,
            }),
            slab_size: slab_size.max(1),
            max_size,
        }
    }

    /// Allocate `size` bytes.
    pub fn get_chunk(&self, size: u64) -> Result<Chunk, SwapError> {
        if size == 0 {
            return Err(SwapError::ZeroSizedChunk);
        }
        let mut list = self.list.lock();

        let (index, chunk) = match list.find_gap(size) {
            Some(g) => {
                let begin = list.gap_start(g);
                (g, Chunk::new(begin, begin + size))
            }
            None => {
                let begin = list.chunks.last().map_or(0, |c| c.end);
                let end = begin + size;
                if end > self.max_size {
                    return Err(SwapError::Exhausted {
                        requested: size,
                        max: self.max_size,
                    });
                }
                let slabs = end.div_ceil(self.slab_size);
                list.store_size = (slabs * self.slab_size).min(self.max_size);
                (list.chunks.len(), Chunk::new(begin, end))
            }
        };

        list.chunks.insert(index, chunk);
        list.cursor = index;
        debug_assert!(list.is_sane(), "chunk list corrupted by {chunk:?}");
        Ok(chunk)
    }

    /// Release a previously allocated chunk.
    ///
    /// Freeing a range that is not allocated leaves the allocator
    /// untouched and reports [`SwapError::UnknownChunk`].
    pub fn free_chunk(&self, chunk: Chunk) -> Result<(), SwapError> {
        let mut list = self.list.lock();
        let index = match list.chunks.binary_search_by_key(&chunk.begin, |c| c.begin) {
            Ok(i) if list.chunks[i] == chunk => i,
            _ => {
                tracing::error!(
                    begin = chunk.begin,
                    end = chunk.end,
                    "freeing a swap chunk that is not allocated"
                );
                return Err(SwapError::UnknownChunk {
                    begin: chunk.begin,
                    end: chunk.end,
                });
            }
        };
        list.chunks.remove(index);
        if list.cursor > index {
            list.cursor -= 1;
        }
        if list.cursor >= list.chunks.len() {
            list.cursor = list.chunks.len().saturating_sub(1);
        }
        Ok(())
    }

    /// Whether `chunk` is currently allocated.
    pub fn contains(&self, chunk: Chunk) -> bool {
        let list = self.list.lock();
        list.chunks
            .binary_search_by_key(&chunk.begin, |c| c.begin)
            .is_ok_and(|i| list.chunks[i] == chunk)
    }

    /// Verify that chunks are sorted, non-empty, non-overlapping and
    /// inside the store.
    pub fn sanity_check(&self) -> bool {
        self.list.lock().is_sane()
    }

    /// Logical size of the swap store in bytes.
    pub fn store_size(&self) -> u64 {
        self.list.lock().store_size
    }

    /// Number of allocated chunks.
    pub fn chunk_count(&self) -> usize {
        self.list.lock().chunks.len()
    }

    /// Sum of all allocated chunk lengths.
    pub fn allocated_bytes(&self) -> u64 {
        self.list.lock().chunks.iter().map(Chunk::len).sum()
    }
}

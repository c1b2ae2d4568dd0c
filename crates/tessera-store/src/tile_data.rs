//! Copy-on-write pixel buffers.
//!
//! A [`TileData`] is one immutable-identity version of a tile's pixels.
//! Ownership is the `Arc` strong count. The separate *users* count records
//! how many logical owners (tiles and committed history items) share this
//! exact version; a writer that sees more than one user must
//! [`duplicate`](TileData::duplicate) first. Users are only ever counted
//! through [`TileDataHandle`], so acquire and release are always paired.
//!
//! The pixel buffer sits behind an `Arc<RwLock<Option<Box<[u8]>>>>`.
//! `None` means the buffer has been written to the swap file; every lock
//! path swaps it back in transparently before handing out a guard.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawRwLock, RwLock};
use tessera_core::{StoreError, SwapError, TileDataId, TILE_PIXELS};
use tessera_swap::Chunk;

use crate::clock::NOT_LISTED;
use crate::pool::MemoryPool;
use crate::store::StoreShared;

type Buffer = Option<Box<[u8]>>;

// ── TileDataState ───────────────────────────────────────────────

/// Residency of a [`TileData`] buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TileDataState {
    /// Pixels are in memory.
    Resident = 0,
    /// The swapper is writing the buffer out.
    SwappingOut = 1,
    /// Pixels live in the swap file only.
    Swapped = 2,
    /// A reader is bringing the buffer back.
    SwappingIn = 3,
}

impl TileDataState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Resident,
            1 => Self::SwappingOut,
            2 => Self::Swapped,
            _ => Self::SwappingIn,
        }
    }
}

// ── TileData ────────────────────────────────────────────────────

/// One version of a tile's pixels.
pub struct TileData {
    id: TileDataId,
    pixel_size: usize,
    buffer: Arc<RwLock<Buffer>>,
    state: AtomicU8,
    users: AtomicUsize,
    age: AtomicU32,
    clones: Mutex<Vec<Box<[u8]>>>,
    swap_chunk: Mutex<Option<Chunk>>,
    pub(crate) clock_slot: AtomicUsize,
    pool: Arc<MemoryPool>,
    store: Arc<StoreShared>,
}

impl TileData {
    pub(crate) fn new(
        store: Arc<StoreShared>,
        pool: Arc<MemoryPool>,
        pixel_size: usize,
        buffer: Box<[u8]>,
    ) -> Self {
        debug_assert_eq!(buffer.len(), pixel_size * TILE_PIXELS);
        Self {
            id: TileDataId::next(),
            pixel_size,
            buffer: Arc::new(RwLock::new(Some(buffer))),
            state: AtomicU8::new(TileDataState::Resident as u8),
            users: AtomicUsize::new(0),
            age: AtomicU32::new(0),
            clones: Mutex::new(Vec::new()),
            swap_chunk: Mutex::new(None),
            clock_slot: AtomicUsize::new(NOT_LISTED),
            pool,
            store,
        }
    }

    /// Unique id of this version.
    pub fn id(&self) -> TileDataId {
        self.id
    }

    /// Bytes per pixel.
    pub fn pixel_size(&self) -> usize {
        self.pixel_size
    }

    /// Length of the pixel buffer in bytes.
    pub fn len(&self) -> usize {
        self.pixel_size * TILE_PIXELS
    }

    /// Always false: tiles have a fixed, non-zero size.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of logical owners sharing this version.
    pub fn users_count(&self) -> usize {
        self.users.load(Ordering::Acquire)
    }

    /// Number of strong references keeping this version alive.
    pub fn ref_count(self: &Arc<Self>) -> usize {
        Arc::strong_count(self)
    }

    /// Current residency.
    pub fn state(&self) -> TileDataState {
        TileDataState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the pixels are in memory.
    pub fn is_resident(&self) -> bool {
        self.state() == TileDataState::Resident
    }

    /// Clock passes survived since the buffer was last locked.
    pub fn age(&self) -> u32 {
        self.age.load(Ordering::Relaxed)
    }

    /// Number of pre-duplicated clones waiting to be consumed.
    pub fn clone_count(&self) -> usize {
        self.clones.lock().len()
    }

    fn acquire(&self) {
        self.users.fetch_add(1, Ordering::AcqRel);
    }

    fn release(&self) {
        let prev = self.users.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "{} released more often than acquired", self.id);
    }

    fn touch(&self) {
        self.age.store(0, Ordering::Relaxed);
    }

    pub(crate) fn bump_age(&self) -> u32 {
        self.age.fetch_add(1, Ordering::Relaxed)
    }

    /// Lock the pixels for reading, swapping them in if needed.
    ///
    /// Read locks are recursive: a thread may hold several read guards on
    /// one version (for example through two tiles sharing it) without
    /// deadlocking against a queued writer.
    pub fn read(self: &Arc<Self>) -> Result<TileDataReadGuard, StoreError> {
        loop {
            let guard = self.buffer.read_arc_recursive();
            if guard.is_some() {
                self.touch();
                return Ok(TileDataReadGuard {
                    guard,
                    data: Arc::clone(self),
                });
            }
            drop(guard);
            self.swap_in()?;
        }
    }

    /// Lock the pixels for writing, swapping them in if needed.
    ///
    /// This does not check the users count; callers that may share this
    /// version go through a tile, which duplicates first. Any prepared
    /// clones are discarded because they are about to go stale.
    pub fn write(self: &Arc<Self>) -> Result<TileDataWriteGuard, StoreError> {
        loop {
            let guard = self.buffer.write_arc();
            if guard.is_some() {
                self.touch();
                self.drop_clones();
                return Ok(TileDataWriteGuard {
                    guard,
                    data: Arc::clone(self),
                });
            }
            drop(guard);
            self.swap_in()?;
        }
    }

    /// Create an unshared copy of this version (users count zero).
    ///
    /// Consumes a clone prepared by the pooler when one is available.
    pub fn duplicate(self: &Arc<Self>) -> Result<Arc<TileData>, StoreError> {
        // The clone list lock must be released before the buffer lock is
        // taken below.
        let prepared = self.clones.lock().pop();
        let buf = match prepared {
            Some(buf) => {
                self.store.note_clone_consumed(buf.len());
                buf
            }
            None => {
                let src = self.read()?;
                let mut buf = self.pool.pop();
                buf.copy_from_slice(&src);
                buf
            }
        };
        self.store.note_cow_copy();
        Ok(self
            .store
            .adopt(Arc::clone(&self.pool), self.pixel_size, buf))
    }

    /// Make sure the pixels are in memory.
    pub fn ensure_resident(self: &Arc<Self>) -> Result<(), StoreError> {
        if self.is_resident() {
            return Ok(());
        }
        self.swap_in()
    }

    fn swap_in(self: &Arc<Self>) -> Result<(), StoreError> {
        {
            let mut guard = self.buffer.write();
            if guard.is_some() {
                return Ok(());
            }
            if self
                .state
                .compare_exchange(
                    TileDataState::Swapped as u8,
                    TileDataState::SwappingIn as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_err()
            {
                tracing::error!(
                    id = %self.id,
                    state = ?self.state(),
                    "buffer missing outside swapped state"
                );
                debug_assert!(false, "buffer missing outside swapped state");
                return Ok(());
            }
            let chunk = *self.swap_chunk.lock();
            let Some(chunk) = chunk else {
                self.state
                    .store(TileDataState::Swapped as u8, Ordering::Release);
                tracing::error!(id = %self.id, "swapped buffer has no swap chunk");
                return Err(StoreError::Swap(SwapError::UnknownChunk { begin: 0, end: 0 }));
            };
            let mut buf = self.pool.pop();
            match self.store.load_swapped(chunk, &mut buf) {
                Ok(()) => {
                    *self.swap_chunk.lock() = None;
                    *guard = Some(buf);
                    self.state
                        .store(TileDataState::Resident as u8, Ordering::Release);
                    self.store.note_swapped_in(self.len());
                    self.touch();
                    tracing::trace!(id = %self.id, "swapped in");
                }
                Err(e) => {
                    self.pool.push(buf);
                    self.state
                        .store(TileDataState::Swapped as u8, Ordering::Release);
                    tracing::warn!(id = %self.id, error = %e, "swap-in failed");
                    return Err(e);
                }
            }
        }
        // Re-list only after the buffer lock is gone.
        self.store.register(self);
        Ok(())
    }

    /// Try to write the buffer out without waiting for any lock.
    ///
    /// Returns `Ok(false)` when the buffer is locked or not resident.
    pub(crate) fn try_swap_out(&self, scratch: &mut Vec<u8>) -> Result<bool, StoreError> {
        let Some(mut guard) = self.buffer.try_write() else {
            return Ok(false);
        };
        let Some(pixels) = guard.as_deref() else {
            return Ok(false);
        };
        if self
            .state
            .compare_exchange(
                TileDataState::Resident as u8,
                TileDataState::SwappingOut as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(false);
        }
        scratch.clear();
        self.store.codec().encode(pixels, scratch);
        match self.store.store_swapped(scratch) {
            Ok(chunk) => {
                *self.swap_chunk.lock() = Some(chunk);
                if let Some(buf) = guard.take() {
                    self.pool.push(buf);
                }
                // Readers that see an empty buffer must also see `Swapped`.
                self.state
                    .store(TileDataState::Swapped as u8, Ordering::Release);
                drop(guard);
                self.drop_clones();
                self.store.note_swapped_out(self.len());
                tracing::trace!(id = %self.id, bytes = scratch.len(), "swapped out");
                Ok(true)
            }
            Err(e) => {
                self.state
                    .store(TileDataState::Resident as u8, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Bring the number of prepared clones in line with the users count.
    ///
    /// Returns the number of clones created plus the number trimmed.
    pub(crate) fn prepare_clones(&self, max_clones: usize, may_grow: bool) -> usize {
        let users = self.users_count();
        let wanted = if users > 1 {
            (users - 1).min(max_clones)
        } else {
            0
        };
        let have = self.clone_count();
        if have > wanted {
            let extra: Vec<Box<[u8]>> = {
                let mut clones = self.clones.lock();
                let keep = wanted.min(clones.len());
                clones.drain(keep..).collect()
            };
            let trimmed = extra.len();
            for buf in extra {
                self.store.note_clone_dropped(buf.len());
                self.pool.push(buf);
            }
            return trimmed;
        }
        if have == wanted || !may_grow {
            return 0;
        }
        // Clones are pushed while the read lock is held, so a writer that
        // drops them after taking the write lock never misses one.
        let Some(guard) = self.buffer.try_read_recursive() else {
            return 0;
        };
        let Some(src) = guard.as_deref() else {
            return 0;
        };
        let mut created = 0;
        for _ in have..wanted {
            let mut buf = self.pool.pop();
            buf.copy_from_slice(src);
            self.store.note_clone_prepared(buf.len());
            self.clones.lock().push(buf);
            created += 1;
        }
        created
    }

    fn drop_clones(&self) {
        let stale: Vec<Box<[u8]>> = std::mem::take(&mut *self.clones.lock());
        for buf in stale {
            self.store.note_clone_dropped(buf.len());
            self.pool.push(buf);
        }
    }
}

impl Drop for TileData {
    fn drop(&mut self) {
        let swapped = self.state() == TileDataState::Swapped;
        if let Some(lock) = Arc::get_mut(&mut self.buffer) {
            if let Some(buf) = lock.get_mut().take() {
                self.pool.push(buf);
            }
        }
        for buf in self.clones.get_mut().drain(..) {
            self.store.note_clone_dropped(buf.len());
            self.pool.push(buf);
        }
        if let Some(chunk) = self.swap_chunk.get_mut().take() {
            self.store.release_swapped(chunk);
        }
        let listed = self.clock_slot.load(Ordering::Relaxed) != NOT_LISTED;
        self.store.note_dropped(self.len(), swapped, listed);
    }
}

impl fmt::Debug for TileData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileData")
            .field("id", &self.id)
            .field("pixel_size", &self.pixel_size)
            .field("state", &self.state())
            .field("users", &self.users_count())
            .finish()
    }
}

// ── TileDataHandle ──────────────────────────────────────────────

/// A counted user of a [`TileData`] version.
///
/// Creating or cloning a handle acquires a user; dropping it releases
/// one. Tiles and committed history items hold handles, which is what
/// makes a version count as shared.
pub struct TileDataHandle {
    data: Arc<TileData>,
}

impl TileDataHandle {
    /// Register a new user of `data`.
    pub fn new(data: Arc<TileData>) -> Self {
        data.acquire();
        Self { data }
    }

    /// The shared version.
    pub fn tile_data(&self) -> &Arc<TileData> {
        &self.data
    }

    /// Whether both handles point at the same version.
    pub fn ptr_eq(&self, other: &TileDataHandle) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Clone for TileDataHandle {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.data))
    }
}

impl Drop for TileDataHandle {
    fn drop(&mut self) {
        self.data.release();
    }
}

impl fmt::Debug for TileDataHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TileDataHandle").field(&self.data.id).finish()
    }
}

// ── Guards ──────────────────────────────────────────────────────

/// Shared access to a version's pixels.
///
/// The guard keeps the version alive; the buffer cannot be swapped out
/// while it exists.
pub struct TileDataReadGuard {
    // Declared first so the lock is released before the version can drop.
    guard: ArcRwLockReadGuard<RawRwLock, Buffer>,
    data: Arc<TileData>,
}

impl TileDataReadGuard {
    /// The locked version.
    pub fn tile_data(&self) -> &Arc<TileData> {
        &self.data
    }
}

impl Deref for TileDataReadGuard {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // Presence is checked when the guard is created and cannot change
        // while it is held.
        self.guard.as_deref().unwrap_or(&[])
    }
}

/// Exclusive access to a version's pixels.
pub struct TileDataWriteGuard {
    guard: ArcRwLockWriteGuard<RawRwLock, Buffer>,
    data: Arc<TileData>,
}

impl TileDataWriteGuard {
    /// The locked version.
    pub fn tile_data(&self) -> &Arc<TileData> {
        &self.data
    }
}

impl Deref for TileDataWriteGuard {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.guard.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for TileDataWriteGuard {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.guard.as_deref_mut().unwrap_or(&mut [])
    }
}

//! The tile-data store: registry, accounting and worker lifecycle.
//!
//! [`TileDataStore`] owns the two background threads. [`StoreHandle`] is
//! the cheap, cloneable view that grids and buffers hold; it stays usable
//! after shutdown (without background eviction).
//!
//! Lock order: the clock list lock comes before any buffer lock, and code
//! holding the clock list only ever *tries* buffer locks. Buffer drops
//! never take the clock list lock.

use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use tessera_core::{StoreConfig, StoreError, TileCodec, TILE_PIXELS};
use tessera_swap::{Chunk, SwapFile};

use crate::clock::{ClockList, NOT_LISTED};
use crate::pool::{MemoryPool, PoolSet};
use crate::stats::{sub_saturating, StoreCounters, StoreStats};
use crate::tile_data::TileData;
use crate::worker::{spawn_worker, Backoff, WorkerMessage};

/// Dead clock entries tolerated before registration reaps them.
const REAP_THRESHOLD: usize = 64;

// ── StoreShared ─────────────────────────────────────────────────

pub(crate) struct StoreShared {
    pub(crate) config: StoreConfig,
    codec: Arc<dyn TileCodec>,
    pools: PoolSet,
    pub(crate) clock: RwLock<ClockList>,
    swap: OnceLock<SwapFile>,
    swap_init: Mutex<()>,
    pub(crate) counters: StoreCounters,
    pooler_tx: Sender<WorkerMessage>,
    swapper_tx: Sender<WorkerMessage>,
}

impl StoreShared {
    pub(crate) fn codec(&self) -> &dyn TileCodec {
        self.codec.as_ref()
    }

    /// Wrap a freshly filled buffer, account for it and list it.
    pub(crate) fn adopt(
        self: &Arc<Self>,
        pool: Arc<MemoryPool>,
        pixel_size: usize,
        buf: Box<[u8]>,
    ) -> Arc<TileData> {
        let len = buf.len();
        self.counters.live.fetch_add(1, Ordering::AcqRel);
        self.counters.resident_bytes.fetch_add(len, Ordering::AcqRel);
        let data = Arc::new(TileData::new(Arc::clone(self), pool, pixel_size, buf));
        self.register(&data);
        self.check_free_memory();
        data
    }

    /// Put a resident buffer on the clock list.
    pub(crate) fn register(&self, data: &Arc<TileData>) {
        let mut clock = self.clock.write();
        if data.clock_slot.load(Ordering::Acquire) != NOT_LISTED {
            return;
        }
        let dead = self.counters.dead_listed.load(Ordering::Acquire);
        if dead > REAP_THRESHOLD && dead * 2 > clock.len() {
            let reaped = clock.reap();
            sub_saturating(&self.counters.dead_listed, reaped);
        }
        let slot = clock.insert(Arc::downgrade(data));
        data.clock_slot.store(slot, Ordering::Release);
    }

    /// Take a buffer off the clock list. Caller holds the list lock.
    pub(crate) fn unregister_locked(&self, clock: &mut ClockList, data: &Arc<TileData>) {
        let slot = data.clock_slot.swap(NOT_LISTED, Ordering::AcqRel);
        if slot != NOT_LISTED && clock.holds(slot, data) {
            clock.remove(slot);
        }
    }

    pub(crate) fn swap_file(&self) -> Result<&SwapFile, StoreError> {
        if let Some(file) = self.swap.get() {
            return Ok(file);
        }
        let _init = self.swap_init.lock();
        if let Some(file) = self.swap.get() {
            return Ok(file);
        }
        let file = SwapFile::create(&self.config)?;
        Ok(self.swap.get_or_init(|| file))
    }

    pub(crate) fn store_swapped(&self, payload: &[u8]) -> Result<Chunk, StoreError> {
        Ok(self.swap_file()?.write(payload)?)
    }

    pub(crate) fn load_swapped(&self, chunk: Chunk, pixels: &mut [u8]) -> Result<(), StoreError> {
        let swap = self.swap_file()?;
        let mut payload = Vec::new();
        swap.read(chunk, &mut payload)?;
        self.codec.decode(&payload, pixels)?;
        if let Err(e) = swap.free(chunk) {
            tracing::warn!(error = %e, "could not release swap chunk after swap-in");
        }
        Ok(())
    }

    pub(crate) fn release_swapped(&self, chunk: Chunk) {
        if let Some(swap) = self.swap.get() {
            let _ = swap.free(chunk);
        }
    }

    pub(crate) fn kick_pooler(&self) {
        let _ = self.pooler_tx.try_send(WorkerMessage::Kick);
    }

    pub(crate) fn kick_swapper(&self) {
        let _ = self.swapper_tx.try_send(WorkerMessage::Kick);
    }

    // ── accounting hooks ────────────────────────────────────────

    pub(crate) fn note_cow_copy(&self) {
        self.counters.cow_copies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_clone_prepared(&self, len: usize) {
        self.counters.prepared_clones.fetch_add(1, Ordering::AcqRel);
        self.counters.resident_bytes.fetch_add(len, Ordering::AcqRel);
    }

    pub(crate) fn note_clone_dropped(&self, len: usize) {
        sub_saturating(&self.counters.prepared_clones, 1);
        sub_saturating(&self.counters.resident_bytes, len);
    }

    pub(crate) fn note_clone_consumed(&self, len: usize) {
        self.note_clone_dropped(len);
        self.counters.clone_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_swapped_out(&self, len: usize) {
        sub_saturating(&self.counters.resident_bytes, len);
        self.counters.swapped.fetch_add(1, Ordering::AcqRel);
        self.counters.swap_outs.fetch_add(1, Ordering::Relaxed);
        self.counters.hard_limit_mode.store(false, Ordering::Release);
    }

    pub(crate) fn note_swapped_in(&self, len: usize) {
        self.counters.resident_bytes.fetch_add(len, Ordering::AcqRel);
        sub_saturating(&self.counters.swapped, 1);
        self.counters.swap_ins.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_swap_failure(&self) {
        self.counters.swap_failures.fetch_add(1, Ordering::Relaxed);
        self.counters.hard_limit_mode.store(true, Ordering::Release);
    }

    pub(crate) fn note_dropped(&self, len: usize, swapped: bool, listed: bool) {
        if swapped {
            sub_saturating(&self.counters.swapped, 1);
        } else {
            sub_saturating(&self.counters.resident_bytes, len);
        }
        if listed {
            self.counters.dead_listed.fetch_add(1, Ordering::AcqRel);
        }
        sub_saturating(&self.counters.live, 1);
    }

    pub(crate) fn resident_bytes(&self) -> usize {
        self.counters.resident_bytes.load(Ordering::Acquire)
    }
}

// ── StoreHandle ─────────────────────────────────────────────────

/// Shared access to a tile-data store.
#[derive(Clone)]
pub struct StoreHandle {
    shared: Arc<StoreShared>,
}

impl StoreHandle {
    /// Allocate a buffer with every pixel set to `pixel`.
    pub fn create_filled(&self, pixel: &[u8]) -> Result<Arc<TileData>, StoreError> {
        if pixel.is_empty() {
            return Err(StoreError::PixelSizeMismatch {
                expected: 1,
                actual: 0,
            });
        }
        let pool = self.shared.pools.pool_for(pixel.len() * TILE_PIXELS);
        let mut buf = pool.pop();
        for px in buf.chunks_exact_mut(pixel.len()) {
            px.copy_from_slice(pixel);
        }
        Ok(self.shared.adopt(pool, pixel.len(), buf))
    }

    /// Allocate a buffer holding a copy of `pixels`, a whole tile of
    /// `pixel_size`-byte pixels.
    pub fn create_from_bytes(
        &self,
        pixel_size: usize,
        pixels: &[u8],
    ) -> Result<Arc<TileData>, StoreError> {
        let len = pixel_size * TILE_PIXELS;
        if pixel_size == 0 || pixels.len() != len {
            return Err(StoreError::PixelSizeMismatch {
                expected: len,
                actual: pixels.len(),
            });
        }
        let pool = self.shared.pools.pool_for(len);
        let mut buf = pool.pop();
        buf.copy_from_slice(pixels);
        Ok(self.shared.adopt(pool, pixel_size, buf))
    }

    /// Wake the pooler.
    pub fn kick_pooler(&self) {
        self.shared.kick_pooler();
    }

    /// Wake the swapper.
    pub fn kick_swapper(&self) {
        self.shared.kick_swapper();
    }

    /// React to memory pressure: kick the swapper above the soft limit,
    /// evict synchronously above the hard limit.
    pub fn check_free_memory(&self) {
        self.shared.check_free_memory();
    }

    /// Evict every resident buffer that is not currently locked.
    ///
    /// Returns the number of buffers written to the swap file.
    pub fn force_swap_out_all(&self) -> Result<usize, StoreError> {
        self.shared.force_swap_out_all()
    }

    /// Run one pooler pass on the calling thread. Returns the number of
    /// clones created or trimmed.
    pub fn run_pooler_pass(&self) -> usize {
        self.shared.pooler_pass()
    }

    /// Run one swapper pass on the calling thread. Returns whether
    /// anything was evicted.
    pub fn run_swapper_pass(&self) -> bool {
        self.shared.swapper_pass()
    }

    /// The configuration the store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// The codec used for swap.
    pub fn codec(&self) -> &dyn TileCodec {
        self.shared.codec()
    }

    /// Number of live pixel buffers.
    pub fn live_tile_data(&self) -> usize {
        self.shared.counters.live.load(Ordering::Acquire)
    }

    /// Snapshot of the store counters.
    pub fn stats(&self) -> StoreStats {
        let c = &self.shared.counters;
        StoreStats {
            live_tile_data: c.live.load(Ordering::Acquire),
            swapped_tile_data: c.swapped.load(Ordering::Acquire),
            resident_bytes: c.resident_bytes.load(Ordering::Acquire),
            prepared_clones: c.prepared_clones.load(Ordering::Acquire),
            clock_entries: self.shared.clock.read().len(),
            pooled_buffers: self.shared.pools.parked_buffers(),
            swap_file_bytes: self.shared.swap.get().map_or(0, SwapFile::file_len),
            cow_copies: c.cow_copies.load(Ordering::Relaxed),
            clone_hits: c.clone_hits.load(Ordering::Relaxed),
            swap_outs: c.swap_outs.load(Ordering::Relaxed),
            swap_ins: c.swap_ins.load(Ordering::Relaxed),
            swap_failures: c.swap_failures.load(Ordering::Relaxed),
            hard_limit_mode: c.hard_limit_mode.load(Ordering::Acquire),
        }
    }

    /// Whether both handles refer to the same store.
    pub fn same_store(&self, other: &StoreHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

// ── ShutdownReport ──────────────────────────────────────────────

/// Report from [`TileDataStore::shutdown`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Number of worker threads joined.
    pub workers_joined: usize,
    /// Final counters.
    pub stats: StoreStats,
}

// ── TileDataStore ───────────────────────────────────────────────

struct Worker {
    tx: Sender<WorkerMessage>,
    join: Option<JoinHandle<()>>,
}

/// Owner of a tile-data store and its pooler and swapper threads.
///
/// Construct one per process (or per test), hand [`StoreHandle`]s to
/// grids, and call [`shutdown`](Self::shutdown) after every grid has
/// been dropped. Dropping the store shuts it down as well.
pub struct TileDataStore {
    handle: StoreHandle,
    workers: Vec<Worker>,
    shut_down: bool,
}

impl TileDataStore {
    /// Build a store swapping through the default (LZ4) codec.
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        Self::with_codec(config, tessera_codec::default_codec())
    }

    /// Build a store swapping through `codec`.
    pub fn with_codec(config: StoreConfig, codec: Arc<dyn TileCodec>) -> Result<Self, StoreError> {
        config.validate()?;
        let (pooler_tx, pooler_rx) = crossbeam_channel::bounded(1);
        let (swapper_tx, swapper_rx) = crossbeam_channel::bounded(1);
        let backoff = Backoff::new(config.worker_backoff_min, config.worker_backoff_max);
        let shared = Arc::new(StoreShared {
            pools: PoolSet::new(config.pool_slots),
            config,
            codec,
            clock: RwLock::new(ClockList::new()),
            swap: OnceLock::new(),
            swap_init: Mutex::new(()),
            counters: StoreCounters::default(),
            pooler_tx: pooler_tx.clone(),
            swapper_tx: swapper_tx.clone(),
        });
        let mut store = Self {
            handle: StoreHandle {
                shared: Arc::clone(&shared),
            },
            workers: Vec::with_capacity(2),
            shut_down: false,
        };

        let pooler = Arc::clone(&shared);
        let join = spawn_worker("tessera-pooler", pooler_rx, backoff.clone(), move || {
            pooler.pooler_pass() > 0
        })
        .map_err(StoreError::Spawn)?;
        store.workers.push(Worker {
            tx: pooler_tx,
            join: Some(join),
        });

        let swapper = shared;
        let join = spawn_worker("tessera-swapper", swapper_rx, backoff, move || {
            swapper.swapper_pass()
        })
        .map_err(StoreError::Spawn)?;
        store.workers.push(Worker {
            tx: swapper_tx,
            join: Some(join),
        });

        tracing::debug!("tile data store started");
        Ok(store)
    }

    /// Shared handle for grids and tools.
    pub fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    /// Stop the background workers and verify nothing leaked.
    ///
    /// Calling it again only repeats the leak check.
    pub fn shutdown(&mut self) -> Result<ShutdownReport, StoreError> {
        let mut workers_joined = 0;
        for worker in &mut self.workers {
            if let Some(join) = worker.join.take() {
                let _ = worker.tx.send(WorkerMessage::Shutdown);
                if join.join().is_ok() {
                    workers_joined += 1;
                }
            }
        }
        self.shut_down = true;
        let stats = self.handle.stats();
        tracing::debug!(workers_joined, live = stats.live_tile_data, "tile data store shut down");
        if stats.live_tile_data > 0 {
            tracing::error!(
                live = stats.live_tile_data,
                "tile data still alive at store shutdown"
            );
            return Err(StoreError::LeakedTileData {
                count: stats.live_tile_data,
            });
        }
        Ok(ShutdownReport {
            workers_joined,
            stats,
        })
    }
}

impl Drop for TileDataStore {
    fn drop(&mut self) {
        if !self.shut_down {
            if let Err(e) = self.shutdown() {
                tracing::error!(error = %e, "tile data store dropped uncleanly");
            }
        }
    }
}

// Compile-time assertion: handles and buffers cross threads freely.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<StoreHandle>();
    assert::<TileData>();
    assert::<TileDataStore>();
};

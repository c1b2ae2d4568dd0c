//! Store counters and their snapshot type.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Point-in-time view of a tile-data store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Pixel buffers alive, resident or swapped.
    pub live_tile_data: usize,
    /// Buffers currently held only in the swap file.
    pub swapped_tile_data: usize,
    /// Bytes of pixel memory held by buffers and prepared clones.
    pub resident_bytes: usize,
    /// Clones prepared by the pooler and not yet consumed.
    pub prepared_clones: usize,
    /// Entries on the clock list (some may belong to dropped buffers).
    pub clock_entries: usize,
    /// Free buffers parked in memory pools.
    pub pooled_buffers: usize,
    /// Physical size of the swap file in bytes.
    pub swap_file_bytes: u64,
    /// Cumulative copy-on-write duplications.
    pub cow_copies: u64,
    /// Cumulative duplications served from a prepared clone.
    pub clone_hits: u64,
    /// Cumulative buffers written to the swap file.
    pub swap_outs: u64,
    /// Cumulative buffers read back from the swap file.
    pub swap_ins: u64,
    /// Cumulative failed swap-outs.
    pub swap_failures: u64,
    /// Set after a failed swap-out, cleared by the next successful one.
    pub hard_limit_mode: bool,
}

#[derive(Default)]
pub(crate) struct StoreCounters {
    pub live: AtomicUsize,
    pub swapped: AtomicUsize,
    pub resident_bytes: AtomicUsize,
    pub prepared_clones: AtomicUsize,
    pub dead_listed: AtomicUsize,
    pub cow_copies: AtomicU64,
    pub clone_hits: AtomicU64,
    pub swap_outs: AtomicU64,
    pub swap_ins: AtomicU64,
    pub swap_failures: AtomicU64,
    pub hard_limit_mode: AtomicBool,
}

pub(crate) fn sub_saturating(counter: &AtomicUsize, n: usize) {
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
        Some(v.saturating_sub(n))
    });
}

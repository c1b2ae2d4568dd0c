//! Pre-duplication of shared buffers.
//!
//! A buffer with `n > 1` users will most likely be copied on write up to
//! `n - 1` times. The pooler prepares those copies off the writer's path
//! and trims them again once sharing ends.

use std::sync::Arc;

use crate::store::StoreShared;
use crate::tile_data::TileData;

impl StoreShared {
    /// One pooler pass. Returns the number of clones created or trimmed.
    pub(crate) fn pooler_pass(&self) -> usize {
        // Collect under the list lock, copy outside it.
        let candidates: Vec<Arc<TileData>> = {
            let clock = self.clock.read();
            clock
                .live_entries_rev()
                .filter(|d| d.users_count() > 1 || d.clone_count() > 0)
                .take(self.config.clock_scan_batch)
                .collect()
        };
        let mut changed = 0;
        for data in &candidates {
            let may_grow = self.resident_bytes() < self.config.memory_soft_limit;
            changed += data.prepare_clones(self.config.max_clones, may_grow);
        }
        if changed > 0 {
            tracing::trace!(candidates = candidates.len(), changed, "pooler pass");
        }
        changed
    }
}

//! Clock-based eviction to the swap file.
//!
//! Every tick of the clock hand ages the entry under it; entries older than
//! `swap_age_threshold` are written out if their buffer lock can be taken
//! without waiting. Locking a buffer resets its age, so hot tiles survive.

use std::sync::atomic::Ordering;

use tessera_core::StoreError;

use crate::stats::sub_saturating;
use crate::store::StoreShared;

impl StoreShared {
    /// Evict until resident memory is at most `target` bytes.
    ///
    /// `force` ignores ages and makes a single sweep. Returns the number
    /// of buffers swapped out.
    pub(crate) fn evict(&self, target: usize, force: bool) -> Result<usize, StoreError> {
        let threshold = self.config.swap_age_threshold;
        let sweeps = if force { 1 } else { threshold as usize + 1 };
        let mut scratch = Vec::new();
        let mut evicted = 0;

        let mut clock = self.clock.write();
        let budget = clock.capacity().saturating_mul(sweeps);
        for _ in 0..budget {
            if self.resident_bytes() <= target {
                break;
            }
            let Some(slot) = clock.tick() else {
                break;
            };
            let Some(data) = clock.get(slot) else {
                if clock.remove(slot) {
                    sub_saturating(&self.counters.dead_listed, 1);
                }
                continue;
            };
            if !force && data.bump_age() < threshold {
                continue;
            }
            match data.try_swap_out(&mut scratch) {
                Ok(true) => {
                    self.unregister_locked(&mut clock, &data);
                    evicted += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    self.note_swap_failure();
                    tracing::warn!(
                        id = %data.id(),
                        error = %e,
                        "swap-out failed, entering hard-limit mode"
                    );
                    return Err(e);
                }
            }
        }
        if evicted > 0 {
            tracing::debug!(evicted, resident = self.resident_bytes(), "evicted tiles");
        }
        Ok(evicted)
    }

    /// One background pass: evict down to 90% of the soft limit.
    ///
    /// Skipped in hard-limit mode; only synchronous eviction retries then.
    pub(crate) fn swapper_pass(&self) -> bool {
        let soft = self.config.memory_soft_limit;
        if self.resident_bytes() <= soft
            || self.counters.hard_limit_mode.load(Ordering::Acquire)
        {
            return false;
        }
        matches!(self.evict(soft / 10 * 9, false), Ok(n) if n > 0)
    }

    pub(crate) fn check_free_memory(&self) {
        let resident = self.resident_bytes();
        if resident > self.config.memory_hard_limit {
            // Failures are already logged and counted by `evict`.
            let _ = self.evict(self.config.memory_soft_limit, false);
        } else if resident > self.config.memory_soft_limit {
            self.kick_swapper();
        }
    }

    pub(crate) fn force_swap_out_all(&self) -> Result<usize, StoreError> {
        self.evict(0, true)
    }
}

//! Store configuration.
//!
//! [`StoreConfig`] is consumed once when a tile-data store is built.
//! Every knob has a `DEFAULT_*` constant; [`StoreConfig::validate`]
//! rejects combinations the store cannot honour.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Offsets and lengths of swap mappings are rounded to this many bytes.
///
/// 64 KiB is a multiple of the page size on every supported platform
/// (and equals the Windows allocation granularity).
pub const MAP_GRANULARITY: u64 = 64 * 1024;

/// Configuration for a tile-data store.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Resident pixel memory above which allocation evicts synchronously.
    pub memory_hard_limit: usize,

    /// Resident pixel memory above which the swapper is woken and the
    /// pooler stops preparing clones.
    pub memory_soft_limit: usize,

    /// Number of free buffers retained per buffer-size class.
    pub pool_slots: usize,

    /// Upper bound on pre-duplicated clones kept for one shared buffer.
    pub max_clones: usize,

    /// Growth step of the swap file in bytes.
    pub swap_slab_size: u64,

    /// Size of each memory-mapped swap window in bytes.
    pub swap_window_size: u64,

    /// The swap file never grows beyond this many bytes.
    pub max_swap_size: u64,

    /// Directory for the swap file. `None` uses the system temp dir.
    pub swap_dir: Option<PathBuf>,

    /// Clock passes a buffer must survive untouched before eviction.
    pub swap_age_threshold: u32,

    /// Shortest sleep of an idle background worker.
    pub worker_backoff_min: Duration,

    /// Longest sleep of an idle background worker.
    pub worker_backoff_max: Duration,

    /// Maximum buffers the pooler inspects per pass.
    pub clock_scan_batch: usize,
}

impl StoreConfig {
    /// Default hard memory limit: 1 GiB.
    pub const DEFAULT_MEMORY_HARD_LIMIT: usize = 1 << 30;

    /// Default soft memory limit: 768 MiB.
    pub const DEFAULT_MEMORY_SOFT_LIMIT: usize = 768 << 20;

    /// Default pool capacity per size class.
    pub const DEFAULT_POOL_SLOTS: usize = 32;

    /// Default clone cap per shared buffer.
    pub const DEFAULT_MAX_CLONES: usize = 16;

    /// Default swap file growth step: 64 MiB.
    pub const DEFAULT_SWAP_SLAB_SIZE: u64 = 64 << 20;

    /// Default swap window size: 16 MiB.
    pub const DEFAULT_SWAP_WINDOW_SIZE: u64 = 16 << 20;

    /// Default swap file ceiling: 16 GiB.
    pub const DEFAULT_MAX_SWAP_SIZE: u64 = 16 << 30;

    /// Default clock age before eviction.
    pub const DEFAULT_SWAP_AGE_THRESHOLD: u32 = 2;

    /// Default minimum worker sleep.
    pub const DEFAULT_WORKER_BACKOFF_MIN: Duration = Duration::from_millis(100);

    /// Default maximum worker sleep.
    pub const DEFAULT_WORKER_BACKOFF_MAX: Duration = Duration::from_secs(10);

    /// Default pooler scan batch.
    pub const DEFAULT_CLOCK_SCAN_BATCH: usize = 512;

    /// Set both memory limits.
    pub fn with_memory_limits(mut self, soft: usize, hard: usize) -> Self {
        self.memory_soft_limit = soft;
        self.memory_hard_limit = hard;
        self
    }

    /// Place the swap file in `dir`.
    pub fn with_swap_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.swap_dir = Some(dir.into());
        self
    }

    /// Set the swap slab, window and ceiling sizes.
    pub fn with_swap_sizes(mut self, slab: u64, window: u64, max: u64) -> Self {
        self.swap_slab_size = slab;
        self.swap_window_size = window;
        self.max_swap_size = max;
        self
    }

    /// Set the idle backoff bounds of the background workers.
    pub fn with_worker_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.worker_backoff_min = min;
        self.worker_backoff_max = max;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_hard_limit == 0 {
            return Err(ConfigError::ZeroValue {
                field: "memory_hard_limit",
            });
        }
        if self.memory_soft_limit == 0 {
            return Err(ConfigError::ZeroValue {
                field: "memory_soft_limit",
            });
        }
        if self.memory_soft_limit > self.memory_hard_limit {
            return Err(ConfigError::SoftLimitAboveHard {
                soft: self.memory_soft_limit,
                hard: self.memory_hard_limit,
            });
        }
        if self.pool_slots == 0 {
            return Err(ConfigError::ZeroValue {
                field: "pool_slots",
            });
        }
        if self.clock_scan_batch == 0 {
            return Err(ConfigError::ZeroValue {
                field: "clock_scan_batch",
            });
        }
        for (field, value) in [
            ("swap_slab_size", self.swap_slab_size),
            ("swap_window_size", self.swap_window_size),
        ] {
            if value == 0 || value % MAP_GRANULARITY != 0 {
                return Err(ConfigError::Misaligned {
                    field,
                    value,
                    granularity: MAP_GRANULARITY,
                });
            }
        }
        if self.max_swap_size < self.swap_slab_size {
            return Err(ConfigError::SwapCeilingTooSmall {
                max: self.max_swap_size,
                slab: self.swap_slab_size,
            });
        }
        if self.worker_backoff_min.is_zero() || self.worker_backoff_min > self.worker_backoff_max
        {
            return Err(ConfigError::InvertedBackoff {
                min: self.worker_backoff_min,
                max: self.worker_backoff_max,
            });
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            memory_hard_limit: Self::DEFAULT_MEMORY_HARD_LIMIT,
            memory_soft_limit: Self::DEFAULT_MEMORY_SOFT_LIMIT,
            pool_slots: Self::DEFAULT_POOL_SLOTS,
            max_clones: Self::DEFAULT_MAX_CLONES,
            swap_slab_size: Self::DEFAULT_SWAP_SLAB_SIZE,
            swap_window_size: Self::DEFAULT_SWAP_WINDOW_SIZE,
            max_swap_size: Self::DEFAULT_MAX_SWAP_SIZE,
            swap_dir: None,
            swap_age_threshold: Self::DEFAULT_SWAP_AGE_THRESHOLD,
            worker_backoff_min: Self::DEFAULT_WORKER_BACKOFF_MIN,
            worker_backoff_max: Self::DEFAULT_WORKER_BACKOFF_MAX,
            clock_scan_batch: Self::DEFAULT_CLOCK_SCAN_BATCH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(StoreConfig::default().validate().is_ok());
    }

    #[test]
    fn default_clone_cap_and_pool_size() {
        let c = StoreConfig::default();
        assert_eq!(c.max_clones, 16);
        assert_eq!(c.pool_slots, 32);
    }

    #[test]
    fn soft_limit_above_hard_rejected() {
        let c = StoreConfig::default().with_memory_limits(2048, 1024);
        assert!(matches!(
            c.validate(),
            Err(ConfigError::SoftLimitAboveHard {
                soft: 2048,
                hard: 1024
            })
        ));
    }

    #[test]
    fn zero_limit_rejected() {
        let c = StoreConfig::default().with_memory_limits(0, 1024);
        assert!(matches!(
            c.validate(),
            Err(ConfigError::ZeroValue {
                field: "memory_soft_limit"
            })
        ));
    }

    #[test]
    fn misaligned_window_rejected() {
        let c = StoreConfig::default().with_swap_sizes(MAP_GRANULARITY, 1000, 1 << 20);
        assert!(matches!(
            c.validate(),
            Err(ConfigError::Misaligned {
                field: "swap_window_size",
                ..
            })
        ));
    }

    #[test]
    fn swap_ceiling_below_slab_rejected() {
        let c = StoreConfig::default().with_swap_sizes(
            2 * MAP_GRANULARITY,
            MAP_GRANULARITY,
            MAP_GRANULARITY,
        );
        assert!(matches!(
            c.validate(),
            Err(ConfigError::SwapCeilingTooSmall { .. })
        ));
    }

    #[test]
    fn inverted_backoff_rejected() {
        let c = StoreConfig::default()
            .with_worker_backoff(Duration::from_secs(2), Duration::from_secs(1));
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvertedBackoff { .. })
        ));
    }

    #[test]
    fn builder_helpers_set_fields() {
        let c = StoreConfig::default()
            .with_swap_dir("/tmp/tessera")
            .with_memory_limits(10, 20);
        assert_eq!(c.swap_dir.as_deref(), Some(std::path::Path::new("/tmp/tessera")));
        assert_eq!(c.memory_soft_limit, 10);
        assert_eq!(c.memory_hard_limit, 20);
    }
}

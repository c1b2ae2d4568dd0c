//! Strongly-typed identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for unique [`TileDataId`] allocation.
static TILE_DATA_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Counter for unique [`MementoId`] allocation.
static MEMENTO_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-instance identifier for a pixel buffer version.
///
/// Allocated from a monotonic atomic counter, so two buffers never share
/// an id even when one is freed and the next lands at the same address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileDataId(u64);

impl TileDataId {
    /// Allocate a fresh, unique id. Thread-safe.
    pub fn next() -> Self {
        Self(TILE_DATA_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TileDataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "td#{}", self.0)
    }
}

/// Unique identifier of one commit boundary in an undo history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MementoId(u64);

impl MementoId {
    /// Allocate a fresh, unique id. Thread-safe.
    pub fn next() -> Self {
        Self(MEMENTO_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MementoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memento#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = TileDataId::next();
        let b = TileDataId::next();
        assert!(b > a);
        let m1 = MementoId::next();
        let m2 = MementoId::next();
        assert_ne!(m1, m2);
    }

    #[test]
    fn display_is_tagged() {
        let id = TileDataId::next();
        assert!(id.to_string().starts_with("td#"));
        assert!(MementoId::next().to_string().starts_with("memento#"));
    }
}

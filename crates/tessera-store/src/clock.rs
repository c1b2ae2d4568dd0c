//! The clock list of resident buffers.
//!
//! Entries are weak references held in a slab: freed slot indices go on a
//! free list and are reused by later insertions, so a buffer's slot index
//! stays stable for as long as it is listed. The clock hand walks the slab
//! cyclically for the swapper's second-chance scan.

use std::sync::{Arc, Weak};

use crate::tile_data::TileData;

/// Sentinel stored in a buffer's slot field while it is not listed.
pub(crate) const NOT_LISTED: usize = usize::MAX;

pub(crate) struct ClockList {
    slots: Vec<Option<Weak<TileData>>>,
    free_list: Vec<usize>,
    hand: usize,
    listed: usize,
}

impl ClockList {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            hand: 0,
            listed: 0,
        }
    }

    pub(crate) fn insert(&mut self, data: Weak<TileData>) -> usize {
        self.listed += 1;
        match self.free_list.pop() {
            Some(i) => {
                self.slots[i] = Some(data);
                i
            }
            None => {
                self.slots.push(Some(data));
                self.slots.len() - 1
            }
        }
    }

    /// Free slot `index`. Returns whether it was listed.
    pub(crate) fn remove(&mut self, index: usize) -> bool {
        let Some(slot) = self.slots.get_mut(index) else {
            return false;
        };
        if slot.take().is_none() {
            return false;
        }
        self.listed -= 1;
        self.free_list.push(index);
        true
    }

    /// Whether slot `index` holds exactly `data`.
    pub(crate) fn holds(&self, index: usize, data: &Arc<TileData>) -> bool {
        matches!(self.slots.get(index), Some(Some(w)) if w.as_ptr() == Arc::as_ptr(data))
    }

    pub(crate) fn get(&self, index: usize) -> Option<Arc<TileData>> {
        self.slots.get(index)?.as_ref()?.upgrade()
    }

    /// Number of slots, listed or free.
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of listed entries, including ones whose buffer already died.
    pub(crate) fn len(&self) -> usize {
        self.listed
    }

    /// Return the slot under the hand and advance it.
    pub(crate) fn tick(&mut self) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        if self.hand >= self.slots.len() {
            self.hand = 0;
        }
        let index = self.hand;
        self.hand += 1;
        Some(index)
    }

    /// Upgrade every live entry, newest slots first, dropping dead ones.
    pub(crate) fn live_entries_rev(&self) -> impl Iterator<Item = Arc<TileData>> + '_ {
        self.slots
            .iter()
            .rev()
            .filter_map(|s| s.as_ref().and_then(Weak::upgrade))
    }

    /// Free every slot whose buffer has been dropped.
    pub(crate) fn reap(&mut self) -> usize {
        let dead: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.as_ref().is_some_and(|w| w.strong_count() == 0))
            .map(|(i, _)| i)
            .collect();
        for &i in &dead {
            self.remove(i);
        }
        dead.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freed_slots_are_reused() {
        let mut clock = ClockList::new();
        let a = clock.insert(Weak::new());
        let b = clock.insert(Weak::new());
        assert_ne!(a, b);
        assert_eq!(clock.len(), 2);
        assert!(clock.remove(a));
        assert!(!clock.remove(a));
        assert_eq!(clock.insert(Weak::new()), a);
        assert_eq!(clock.capacity(), 2);
    }

    #[test]
    fn hand_wraps_around() {
        let mut clock = ClockList::new();
        assert_eq!(clock.tick(), None);
        clock.insert(Weak::new());
        clock.insert(Weak::new());
        let ticks: Vec<_> = (0..5).filter_map(|_| clock.tick()).collect();
        assert_eq!(ticks, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn reap_frees_dead_entries() {
        let mut clock = ClockList::new();
        for _ in 0..3 {
            clock.insert(Weak::new());
        }
        assert_eq!(clock.get(1).map(|_| ()), None);
        assert_eq!(clock.reap(), 3);
        assert_eq!(clock.len(), 0);
        assert_eq!(clock.live_entries_rev().count(), 0);
    }
}

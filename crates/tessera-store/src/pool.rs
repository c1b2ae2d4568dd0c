//! Fixed-capacity pools of equally sized pixel buffers.
//!
//! A [`MemoryPool`] is an array of atomic slots. `pop` claims the first
//! non-empty slot with an atomic swap and falls back to a fresh zeroed
//! allocation; `push` parks a buffer in the first empty slot with a
//! compare-and-swap, or frees it when every slot is taken. Neither path
//! takes a lock.

#![allow(unsafe_code)]

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::raw;

/// Lock-free pool of buffers of one byte length.
pub struct MemoryPool {
    slots: Box<[AtomicPtr<u8>]>,
    buffer_len: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryPool {
    /// Create a pool holding up to `capacity` buffers of `buffer_len` bytes.
    pub fn new(buffer_len: usize, capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        Self {
            slots,
            buffer_len,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Length of the buffers this pool serves.
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Take a buffer. Its contents are unspecified.
    pub fn pop(&self) -> Box<[u8]> {
        for slot in self.slots.iter() {
            if slot.load(Ordering::Relaxed).is_null() {
                continue;
            }
            let p = slot.swap(ptr::null_mut(), Ordering::AcqRel);
            if !p.is_null() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                // SAFETY: only `push` stores non-null pointers, each from
                // `raw::into_raw` on a `buffer_len` buffer, and the swap
                // above gives this thread sole ownership of it.
                return unsafe { raw::from_raw(p, self.buffer_len) };
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        vec![0u8; self.buffer_len].into_boxed_slice()
    }

    /// Return a buffer to the pool, freeing it if the pool is full.
    pub fn push(&self, buf: Box<[u8]>) {
        if buf.len() != self.buffer_len {
            debug_assert!(
                false,
                "buffer of {} bytes pushed to {}-byte pool",
                buf.len(),
                self.buffer_len
            );
            return;
        }
        let p = raw::into_raw(buf);
        for slot in self.slots.iter() {
            if slot
                .compare_exchange(ptr::null_mut(), p, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
        // SAFETY: `p` was produced just above and no slot accepted it.
        drop(unsafe { raw::from_raw(p, self.buffer_len) });
    }

    /// Number of buffers currently parked.
    pub fn available(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !s.load(Ordering::Relaxed).is_null())
            .count()
    }

    /// `(hits, misses)` of `pop` since creation.
    pub fn hit_stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl Drop for MemoryPool {
    fn drop(&mut self) {
        for slot in self.slots.iter() {
            let p = slot.swap(ptr::null_mut(), Ordering::AcqRel);
            if !p.is_null() {
                // SAFETY: same invariant as in `pop`.
                drop(unsafe { raw::from_raw(p, self.buffer_len) });
            }
        }
    }
}

/// One [`MemoryPool`] per buffer length in use.
pub(crate) struct PoolSet {
    pools: RwLock<Vec<Arc<MemoryPool>>>,
    capacity: usize,
}

impl PoolSet {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            pools: RwLock::new(Vec::new()),
            capacity,
        }
    }

    /// The pool for `buffer_len`-byte buffers, created on first use.
    pub(crate) fn pool_for(&self, buffer_len: usize) -> Arc<MemoryPool> {
        if let Some(p) = self
            .pools
            .read()
            .iter()
            .find(|p| p.buffer_len == buffer_len)
        {
            return Arc::clone(p);
        }
        let mut pools = self.pools.write();
        if let Some(p) = pools.iter().find(|p| p.buffer_len == buffer_len) {
            return Arc::clone(p);
        }
        let pool = Arc::new(MemoryPool::new(buffer_len, self.capacity));
        pools.push(Arc::clone(&pool));
        pool
    }

    pub(crate) fn parked_buffers(&self) -> usize {
        self.pools.read().iter().map(|p| p.available()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_allocates() {
        let pool = MemoryPool::new(64, 4);
        let b = pool.pop();
        assert_eq!(b.len(), 64);
        assert_eq!(pool.hit_stats(), (0, 1));
    }

    #[test]
    fn pushed_buffer_is_reused() {
        let pool = MemoryPool::new(16, 4);
        let mut b = pool.pop();
        b[0] = 42;
        let addr = b.as_ptr();
        pool.push(b);
        assert_eq!(pool.available(), 1);
        let again = pool.pop();
        assert_eq!(again.as_ptr(), addr);
        assert_eq!(again[0], 42);
        assert_eq!(pool.hit_stats(), (1, 1));
    }

    #[test]
    fn full_pool_frees_extra_buffers() {
        let pool = MemoryPool::new(8, 2);
        for _ in 0..5 {
            pool.push(vec![0u8; 8].into_boxed_slice());
        }
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn pool_set_separates_size_classes() {
        let set = PoolSet::new(4);
        let a = set.pool_for(64 * 64 * 4);
        let b = set.pool_for(64 * 64 * 8);
        let a2 = set.pool_for(64 * 64 * 4);
        assert!(Arc::ptr_eq(&a, &a2));
        assert!(!Arc::ptr_eq(&a, &b));
        a.push(a.pop());
        assert_eq!(set.parked_buffers(), 1);
    }

    #[test]
    fn concurrent_push_pop_keeps_lengths() {
        let pool = Arc::new(MemoryPool::new(128, 8));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let b = pool.pop();
                        assert_eq!(b.len(), 128);
                        pool.push(b);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(pool.available() <= 8);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parked_count_matches_model(
                ops in proptest::collection::vec(any::<bool>(), 1..200),
                capacity in 1usize..8,
            ) {
                let pool = MemoryPool::new(32, capacity);
                let mut held = Vec::new();
                let mut parked = 0usize;
                let (mut hits, mut misses) = (0u64, 0u64);
                for push in ops {
                    if push {
                        if let Some(buf) = held.pop() {
                            pool.push(buf);
                            parked = (parked + 1).min(capacity);
                        }
                    } else {
                        if parked > 0 {
                            parked -= 1;
                            hits += 1;
                        } else {
                            misses += 1;
                        }
                        held.push(pool.pop());
                    }
                    prop_assert_eq!(pool.available(), parked);
                }
                prop_assert_eq!(pool.hit_stats(), (hits, misses));
            }
        }
    }
}

//! Low-level pointer conversions for pooled buffers.
//!
//! Pool slots are `AtomicPtr<u8>` and can only hold thin pointers, while
//! buffers are `Box<[u8]>`. Every pool is dedicated to one buffer length,
//! so the length is known when a pointer comes back out of a slot and the
//! fat pointer can be rebuilt. These are the only `unsafe` functions in
//! the crate.

#![allow(unsafe_code)]

use std::ptr;

/// Give up ownership of `buf`, returning its data pointer.
pub(crate) fn into_raw(buf: Box<[u8]>) -> *mut u8 {
    Box::into_raw(buf) as *mut u8
}

/// Rebuild a buffer previously released with [`into_raw`].
///
/// # Safety
///
/// `data` must come from [`into_raw`] on a buffer of exactly `len` bytes,
/// and must not have been rebuilt since.
pub(crate) unsafe fn from_raw(data: *mut u8, len: usize) -> Box<[u8]> {
    // SAFETY: upheld by the caller; the slice pointer reproduces the
    // original allocation's address and length.
    unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(data, len)) }
}

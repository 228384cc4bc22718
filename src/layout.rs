//! On-disk / in-memory layout of the shared ring segment.
//!
//! A ring file is one header page followed by `capacity` data bytes:
//!
//! ```text
//! offset 0 ............ page_size-1   header page (RingHeader + padding)
//! offset page_size .... page_size+C-1 ring data
//! ```
//!
//! The header's three hot fields (`head`, `eof`, `tail`) each sit on their
//! own 64-byte cache line so the core writing one never invalidates the
//! line holding another.

use core::mem::size_of;
use core::ptr;

use crate::sync::{AtomicU64, Ordering};

/// Segment ABI version written to and checked against `RingHeader::version`.
pub const VERSION: u64 = 1;

/// Ring names must be shorter than this, excluding the NUL terminator.
pub const NAME_MAX: usize = 128;

/// Smallest permitted ring capacity in bytes.
pub const MIN_CAPACITY: u64 = 8;

/// Size of the initialized header prefix. The header page as a whole is
/// `page_size` bytes; everything past this offset is zero padding.
pub const HEADER_SIZE: usize = 256;

const CACHE_LINE: usize = 64;

/// Shared segment header, mapped read-write by both endpoints.
///
/// Field order is ABI: three immutable u64s, then one index per cache
/// line. All values little-endian on the only supported target.
#[repr(C)]
pub struct RingHeader {
    /// ABI version, must equal [`VERSION`]. Immutable after init.
    pub version: u64,
    /// Ring capacity in bytes, a power of two. Immutable after init.
    pub capacity: u64,
    /// Page size of the backing filesystem. Immutable after init.
    pub page_size: u64,
    _pad0: [u8; CACHE_LINE - 3 * size_of::<u64>()],

    /// Bytes ever committed by the producer. Free-rolling, wraps at 2^64.
    pub head: AtomicU64,
    _pad1: [u8; CACHE_LINE - size_of::<u64>()],

    /// Non-zero once the producer will write no more. Monotonic.
    pub eof: AtomicU64,
    _pad2: [u8; CACHE_LINE - size_of::<u64>()],

    /// Bytes ever consumed by the consumer. Free-rolling, wraps at 2^64.
    pub tail: AtomicU64,
    _pad3: [u8; CACHE_LINE - size_of::<u64>()],
}

#[cfg(not(loom))]
const _: () = assert!(size_of::<RingHeader>() == HEADER_SIZE);

impl RingHeader {
    /// Initialize a header in place.
    ///
    /// The index stores use release ordering so a consumer that can see
    /// the published name is guaranteed to see zeroed indices.
    ///
    /// # Safety
    ///
    /// `this` must point to `HEADER_SIZE` writable bytes, 64-byte aligned,
    /// not yet shared with any other thread or process.
    pub unsafe fn init(this: *mut Self, capacity: u64, page_size: u64) {
        unsafe {
            ptr::addr_of_mut!((*this).version).write(VERSION);
            ptr::addr_of_mut!((*this).capacity).write(capacity);
            ptr::addr_of_mut!((*this).page_size).write(page_size);
            ptr::addr_of_mut!((*this)._pad0).write([0; CACHE_LINE - 3 * size_of::<u64>()]);
            ptr::addr_of_mut!((*this).head).write(AtomicU64::new(0));
            ptr::addr_of_mut!((*this)._pad1).write([0; CACHE_LINE - size_of::<u64>()]);
            ptr::addr_of_mut!((*this).eof).write(AtomicU64::new(0));
            ptr::addr_of_mut!((*this)._pad2).write([0; CACHE_LINE - size_of::<u64>()]);
            ptr::addr_of_mut!((*this).tail).write(AtomicU64::new(0));
            ptr::addr_of_mut!((*this)._pad3).write([0; CACHE_LINE - size_of::<u64>()]);
            (*this).head.store(0, Ordering::Release);
            (*this).tail.store(0, Ordering::Release);
        }
    }

    /// Index mask; valid because capacity is a power of two.
    #[inline]
    pub fn mask(&self) -> u64 {
        self.capacity - 1
    }

    /// Check the immutable fields of a header mapped from an existing file.
    ///
    /// Returns the first violated field. The version check is reported
    /// separately by the caller so it can surface as `UnsupportedVersion`.
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.capacity < MIN_CAPACITY || !self.capacity.is_power_of_two() {
            return Err("capacity is not a power of two");
        }
        if self.page_size == 0 || !self.capacity.is_multiple_of(self.page_size) {
            return Err("capacity is not a multiple of the page size");
        }
        Ok(())
    }
}

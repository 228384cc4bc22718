//! Write side of the ring.

use std::slice;

use crate::error::Result;
use crate::ring::{RawRing, RingFull, RingStatus};
use crate::segment::{CreateOptions, Segment};

/// The producing endpoint: creates the ring, owns `head` and `eof`.
///
/// Writing is two-phase: [`push`](Producer::push) reserves a contiguous
/// byte range, the caller fills it in place, and
/// [`commit`](Producer::commit) publishes a prefix of it. Over-reserving
/// is the intended idiom for callers that hand the buffer to `read(2)`
/// and only afterwards learn how many bytes arrived.
///
/// Dropping the producer signals end-of-stream and unpublishes the ring
/// name; consumers that already mapped the segment keep draining it.
#[derive(Debug)]
pub struct Producer {
    ring: RawRing,
    /// Cached consumer index; refreshed only when a reservation misses.
    local_tail: u64,
    /// Size of the outstanding reservation, 0 if none.
    reserved: usize,
    /// Owns the mapping and the published name. Dropped last.
    _segment: Segment,
}

// The endpoint moves to whichever thread produces, but only one thread
// may use it at a time.
unsafe impl Send for Producer {}

impl Producer {
    /// Create and publish a ring named `name` with `capacity` data bytes.
    ///
    /// `capacity` must be a power of two, at least
    /// [`MIN_CAPACITY`](crate::MIN_CAPACITY), and a multiple of the
    /// backing filesystem's page size.
    pub fn create(name: &str, capacity: u64, opts: &CreateOptions) -> Result<Producer> {
        let segment = Segment::create(name, capacity, opts)?;
        let ring = segment.raw_ring();
        Ok(Producer {
            ring,
            local_tail: 0,
            reserved: 0,
            _segment: segment,
        })
    }

    /// Reserve exactly `n` contiguous writable bytes, or report
    /// [`RingFull`].
    ///
    /// The returned slice is always contiguous, even when the reservation
    /// crosses the ring's wrap point, and contains whatever stale bytes
    /// previously occupied the positions. Nothing becomes visible to the
    /// consumer until [`commit`](Producer::commit).
    pub fn push(&mut self, n: usize) -> std::result::Result<&mut [u8], RingFull> {
        debug_assert_eq!(self.reserved, 0, "push with an outstanding reservation");
        let at = self.ring.reserve(&mut self.local_tail, n)?;
        self.reserved = n;
        Ok(unsafe { slice::from_raw_parts_mut(at.as_ptr(), n) })
    }

    /// Publish the first `n` bytes of the current reservation.
    ///
    /// `n` may be smaller than the reserved length; the remainder is
    /// simply not published and the reservation ends either way.
    pub fn commit(&mut self, n: usize) {
        debug_assert!(self.reserved > 0, "commit without a reservation");
        debug_assert!(
            n <= self.reserved,
            "commit of {n} bytes exceeds the {}-byte reservation",
            self.reserved
        );
        self.ring.commit_write(n as u64);
        self.reserved = 0;
    }

    /// Ring capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.ring.capacity()
    }

    /// Page size of the backing filesystem.
    #[inline]
    pub fn page_size(&self) -> u64 {
        self.ring.header().page_size
    }

    /// Committed-but-unconsumed bytes. Advisory.
    #[inline]
    pub fn used(&self) -> u64 {
        self.ring.writer_status().used
    }

    /// Bytes currently reservable. Advisory.
    #[inline]
    pub fn free(&self) -> u64 {
        self.capacity() - self.used()
    }

    /// True when nothing is buffered. Advisory.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used() == 0
    }

    /// True when no byte can be reserved. Advisory.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.used() == self.capacity()
    }

    /// Index snapshot for diagnostics.
    pub fn status(&self) -> RingStatus {
        self.ring.writer_status()
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        // End-of-stream must be visible before the name disappears; the
        // segment unlinks in its own drop, after this store.
        self.ring.set_eof();
    }
}

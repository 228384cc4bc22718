//! The lock-free index protocol over a double-mapped byte ring.
//!
//! `RawRing` is a view over two raw pointers: the shared [`RingHeader`]
//! and the base of the ring's data span. The data span is assumed to be
//! *doubled* — `2 * capacity` bytes valid, with byte `capacity + i`
//! aliasing byte `i` — so every range handed out here is contiguous no
//! matter where it starts.
//!
//! Ownership discipline: the producer is the sole writer of `head` and
//! `eof`, the consumer the sole writer of `tail`. Each side reads its own
//! index relaxed and the peer's with acquire, and publishes with release.
//! Those two release/acquire pairs are the entire synchronization story;
//! the byte copies themselves are ordinary loads and stores ordered by
//! the index handoff.

use core::ptr::NonNull;

use crate::layout::RingHeader;
use crate::sync::Ordering;

/// The reservation does not fit; the caller retries after the consumer
/// makes progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingFull;

/// Advisory snapshot of the ring indices.
#[derive(Debug, Clone, Copy)]
pub struct RingStatus {
    /// Bytes ever committed by the producer.
    pub head: u64,
    /// Bytes ever consumed by the consumer.
    pub tail: u64,
    /// Ring capacity in bytes.
    pub capacity: u64,
    /// `head - tail` at snapshot time.
    pub used: u64,
}

/// What the consumer side currently sees.
pub(crate) enum Readable {
    /// `len` contiguous bytes starting at `at`.
    Bytes { at: NonNull<u8>, len: usize },
    /// Nothing buffered, producer still alive.
    Empty,
    /// Nothing buffered and the producer has signalled end of stream.
    Eof,
}

/// Raw view of a shared ring. No lifecycle, no validation; the segment
/// layer owns the mapping and the endpoint types own the local caches.
#[derive(Debug)]
pub(crate) struct RawRing {
    header: NonNull<RingHeader>,
    data: NonNull<u8>,
}

// One endpoint lives on each side; the header is built for concurrent
// access and the data ranges handed out never overlap between sides.
unsafe impl Send for RawRing {}
unsafe impl Sync for RawRing {}

impl RawRing {
    /// # Safety
    ///
    /// - `header` must point to an initialized `RingHeader` with a
    ///   power-of-two capacity.
    /// - `data` must be valid for `2 * capacity` bytes, with the second
    ///   half aliasing the first (or the caller must confine traffic to
    ///   ranges that do not cross the boundary, as the heap-backed tests
    ///   do).
    /// - Both must outlive the `RawRing`.
    pub(crate) unsafe fn from_raw(header: NonNull<RingHeader>, data: NonNull<u8>) -> Self {
        Self { header, data }
    }

    #[inline]
    pub(crate) fn header(&self) -> &RingHeader {
        unsafe { self.header.as_ref() }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> u64 {
        self.header().capacity
    }

    #[inline]
    fn data_at(&self, index: u64) -> NonNull<u8> {
        let masked = (index & self.header().mask()) as usize;
        unsafe { NonNull::new_unchecked(self.data.as_ptr().add(masked)) }
    }

    // ── producer side ───────────────────────────────────────────────────

    /// Reserve `n` contiguous writable bytes at the current head.
    ///
    /// `local_tail` is the producer's cached copy of the consumer index;
    /// it is refreshed (one acquire load) only when the cached value shows
    /// insufficient space, which keeps the common case free of coherence
    /// traffic.
    pub(crate) fn reserve(
        &self,
        local_tail: &mut u64,
        n: usize,
    ) -> Result<NonNull<u8>, RingFull> {
        let header = self.header();
        // Sole writer of head: reading our own store needs no barrier.
        let head = header.head.load(Ordering::Relaxed);

        let free = header.capacity - head.wrapping_sub(*local_tail);
        if n as u64 > free {
            *local_tail = header.tail.load(Ordering::Acquire);
            let free = header.capacity - head.wrapping_sub(*local_tail);
            if n as u64 > free {
                return Err(RingFull);
            }
        }
        Ok(self.data_at(head))
    }

    /// Publish `n` reserved bytes. The release store pairs with the
    /// consumer's acquire load of `head`, carrying the byte writes.
    pub(crate) fn commit_write(&self, n: u64) {
        let header = self.header();
        let head = header.head.load(Ordering::Relaxed);
        header.head.store(head.wrapping_add(n), Ordering::Release);
    }

    /// Mark the stream finished. Monotonic; called once at teardown.
    pub(crate) fn set_eof(&self) {
        self.header().eof.store(1, Ordering::Release);
    }

    pub(crate) fn writer_status(&self) -> RingStatus {
        let header = self.header();
        let head = header.head.load(Ordering::Relaxed);
        let tail = header.tail.load(Ordering::Acquire);
        RingStatus {
            head,
            tail,
            capacity: header.capacity,
            used: head.wrapping_sub(tail),
        }
    }

    // ── consumer side ───────────────────────────────────────────────────

    /// Report everything readable as one contiguous range.
    ///
    /// `local_head` is the consumer's cached copy of the producer index,
    /// refreshed only when the cache says nothing is buffered. EOF is
    /// checked last so buffered bytes always drain before the stream ends.
    pub(crate) fn readable(&self, local_head: &mut u64) -> Readable {
        let header = self.header();
        // Sole writer of tail: relaxed is enough to read our own store.
        let tail = header.tail.load(Ordering::Relaxed);

        let mut len = local_head.wrapping_sub(tail);
        if len == 0 {
            *local_head = header.head.load(Ordering::Acquire);
            len = local_head.wrapping_sub(tail);
            if len == 0 {
                if header.eof.load(Ordering::Acquire) != 0 {
                    return Readable::Eof;
                }
                return Readable::Empty;
            }
        }
        Readable::Bytes {
            at: self.data_at(tail),
            len: len as usize,
        }
    }

    /// Retire `n` consumed bytes. The release store pairs with the
    /// producer's acquire load of `tail`, so the producer can only reuse
    /// the space after our reads have completed.
    pub(crate) fn commit_read(&self, n: u64) {
        let header = self.header();
        let tail = header.tail.load(Ordering::Relaxed);
        header.tail.store(tail.wrapping_add(n), Ordering::Release);
    }

    pub(crate) fn reader_status(&self) -> RingStatus {
        let header = self.header();
        let head = header.head.load(Ordering::Acquire);
        let tail = header.tail.load(Ordering::Relaxed);
        RingStatus {
            head,
            tail,
            capacity: header.capacity,
            used: head.wrapping_sub(tail),
        }
    }
}

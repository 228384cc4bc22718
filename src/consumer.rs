//! Read side of the ring.

use std::slice;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::ring::{RawRing, Readable, RingStatus};
use crate::segment::{OpenOptions, Segment};
use crate::sync::Ordering;

/// Outcome of a [`Consumer::pop`].
#[derive(Debug, PartialEq, Eq)]
pub enum PopResult<'a> {
    /// Everything currently readable, as one contiguous slice. Call
    /// [`Consumer::commit`] with at most this many bytes once done.
    Bytes(&'a [u8]),
    /// Nothing buffered; the producer is still live. Spin and retry.
    Empty,
    /// Nothing buffered and the producer is gone for good.
    Eof,
}

/// The consuming endpoint: opens a published ring, owns `tail`.
///
/// Reading is two-phase like writing: [`pop`](Consumer::pop) exposes the
/// readable bytes in place, [`commit`](Consumer::commit) retires however
/// many of them the caller actually processed.
#[derive(Debug)]
pub struct Consumer {
    ring: RawRing,
    /// Cached producer index; refreshed only when the cache reads empty.
    local_head: u64,
    _segment: Segment,
}

unsafe impl Send for Consumer {}

impl Consumer {
    /// Open the ring published under `name`.
    ///
    /// Fails immediately if the name does not exist yet; use
    /// [`open_blocking`](Consumer::open_blocking) to wait for a producer
    /// that is still starting up.
    pub fn open(name: &str, opts: &OpenOptions) -> Result<Consumer> {
        let segment = Segment::open(name, opts)?;
        let ring = segment.raw_ring();
        let local_head = ring.header().head.load(Ordering::Acquire);
        Ok(Consumer {
            ring,
            local_head,
            _segment: segment,
        })
    }

    /// Open the ring, retrying every millisecond until `timeout` elapses.
    ///
    /// This is the only blocking call in the crate; it exists for the
    /// common race where the consumer process starts before the producer
    /// has published the name.
    pub fn open_blocking(name: &str, opts: &OpenOptions, timeout: Duration) -> Result<Consumer> {
        let deadline = Instant::now() + timeout;
        loop {
            match Consumer::open(name, opts) {
                Ok(consumer) => return Ok(consumer),
                Err(err) => {
                    if Instant::now() >= deadline {
                        tracing::debug!(ring = name, error = %err, "open deadline exhausted");
                        return Err(Error::Timeout);
                    }
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    /// Expose all currently readable bytes as one contiguous slice.
    ///
    /// The slice stays valid until the next call on this consumer; the
    /// bytes are not retired until [`commit`](Consumer::commit). An empty
    /// ring reports [`PopResult::Eof`] only once the producer has signalled
    /// end-of-stream, so buffered data always drains first.
    pub fn pop(&mut self) -> PopResult<'_> {
        match self.ring.readable(&mut self.local_head) {
            Readable::Bytes { at, len } => {
                PopResult::Bytes(unsafe { slice::from_raw_parts(at.as_ptr(), len) })
            }
            Readable::Empty => PopResult::Empty,
            Readable::Eof => PopResult::Eof,
        }
    }

    /// Retire `n` consumed bytes, freeing them for the producer.
    ///
    /// `n` must not exceed the length of the slice most recently returned
    /// by [`pop`](Consumer::pop).
    pub fn commit(&mut self, n: usize) {
        debug_assert!(
            n as u64
                <= self
                    .local_head
                    .wrapping_sub(self.ring.header().tail.load(Ordering::Relaxed)),
            "commit of {n} bytes exceeds the readable span"
        );
        self.ring.commit_read(n as u64);
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
        self.ring.reader_status().used
    }

    /// Bytes the producer could currently reserve. Advisory.
    #[inline]
    pub fn free(&self) -> u64 {
        self.capacity() - self.used()
    }

    /// True when nothing is buffered. Advisory.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used() == 0
    }

    /// True when the ring is at capacity. Advisory.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.used() == self.capacity()
    }

    /// Index snapshot for diagnostics.
    pub fn status(&self) -> RingStatus {
        self.ring.reader_status()
    }
}

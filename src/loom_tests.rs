//! Loom model checks of the index and EOF protocol.
//!
//! Build with `RUSTFLAGS="--cfg loom" cargo test --lib loom`. These models
//! drive `RawRing` over heap memory; they exhaustively interleave the
//! head/tail/eof traffic, which is the entire cross-endpoint protocol.
//! Chunk sizes divide the capacity so no transfer crosses the capacity
//! boundary (the heap stand-in has no alias mapping).

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::mem::size_of;
use std::ptr::{self, NonNull};
use std::slice;

use loom::sync::Arc;
use loom::thread;

use crate::layout::RingHeader;
use crate::ring::{RawRing, Readable, RingFull};

const CAPACITY: u64 = 8;

struct ModelAlloc {
    ptr: *mut u8,
    layout: Layout,
}

unsafe impl Send for ModelAlloc {}
unsafe impl Sync for ModelAlloc {}

impl ModelAlloc {
    fn new() -> Self {
        let layout =
            Layout::from_size_align(size_of::<RingHeader>() + 2 * CAPACITY as usize, 64).unwrap();
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        unsafe { RingHeader::init(ptr as *mut RingHeader, CAPACITY, CAPACITY) };
        ModelAlloc { ptr, layout }
    }

    fn ring(&self) -> RawRing {
        unsafe {
            RawRing::from_raw(
                NonNull::new(self.ptr as *mut RingHeader).unwrap(),
                NonNull::new(self.ptr.add(size_of::<RingHeader>())).unwrap(),
            )
        }
    }
}

impl Drop for ModelAlloc {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, self.layout) }
    }
}

#[test]
fn bytes_arrive_in_order_then_eof() {
    loom::model(|| {
        let alloc = Arc::new(ModelAlloc::new());

        let producer_alloc = alloc.clone();
        let producer = thread::spawn(move || {
            let ring = producer_alloc.ring();
            let mut local_tail = 0u64;
            for chunk in [[1u8, 2, 3, 4], [5, 6, 7, 8]] {
                loop {
                    match ring.reserve(&mut local_tail, chunk.len()) {
                        Ok(at) => {
                            unsafe {
                                ptr::copy_nonoverlapping(chunk.as_ptr(), at.as_ptr(), chunk.len())
                            };
                            ring.commit_write(chunk.len() as u64);
                            break;
                        }
                        Err(RingFull) => thread::yield_now(),
                    }
                }
            }
            ring.set_eof();
        });

        let consumer_alloc = alloc.clone();
        let consumer = thread::spawn(move || {
            let ring = consumer_alloc.ring();
            let mut local_head = 0u64;
            let mut received = Vec::new();
            loop {
                match ring.readable(&mut local_head) {
                    Readable::Bytes { at, len } => {
                        received
                            .extend_from_slice(unsafe { slice::from_raw_parts(at.as_ptr(), len) });
                        ring.commit_read(len as u64);
                    }
                    Readable::Empty => thread::yield_now(),
                    Readable::Eof => break,
                }
            }
            received
        });

        producer.join().unwrap();
        let received = consumer.join().unwrap();
        assert_eq!(received, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    });
}

#[test]
fn occupancy_bound_holds_under_interleaving() {
    loom::model(|| {
        let alloc = Arc::new(ModelAlloc::new());

        let producer_alloc = alloc.clone();
        let producer = thread::spawn(move || {
            let ring = producer_alloc.ring();
            let mut local_tail = 0u64;
            // Two reservations of half the ring each; the second must wait
            // for the consumer when the first is still buffered.
            for _ in 0..2 {
                loop {
                    match ring.reserve(&mut local_tail, 4) {
                        Ok(_) => {
                            ring.commit_write(4);
                            break;
                        }
                        Err(RingFull) => thread::yield_now(),
                    }
                }
                let status = ring.writer_status();
                assert!(status.used <= status.capacity);
            }
        });

        let consumer_alloc = alloc.clone();
        let consumer = thread::spawn(move || {
            let ring = consumer_alloc.ring();
            let mut local_head = 0u64;
            let mut remaining = 8u64;
            while remaining > 0 {
                match ring.readable(&mut local_head) {
                    Readable::Bytes { len, .. } => {
                        let status = ring.reader_status();
                        assert!(status.used <= status.capacity);
                        ring.commit_read(len as u64);
                        remaining -= len as u64;
                    }
                    _ => thread::yield_now(),
                }
            }
        });

        producer.join().unwrap();
        consumer.join().unwrap();
    });
}

//! Double-mapped SPSC byte queue over RAM-backed shared memory.
//!
//! `chute` moves an arbitrary byte stream between two pinned processes (or
//! threads) through a file-backed shared-memory ring at main-memory
//! bandwidth. One process owns the write side, one owns the read side;
//! coordination happens over two free-rolling 64-bit indices with a single
//! release/acquire pair in each direction and no locks of any kind.
//!
//! # Architecture
//!
//! ```text
//!  producer process                         consumer process
//! ┌──────────────────┐                     ┌──────────────────┐
//! │ Producer         │                     │ Consumer         │
//! │  push / commit   │                     │  pop / commit    │
//! └────────┬─────────┘                     └────────┬─────────┘
//!          │ mmap (rw)                              │ mmap (ro data)
//!          ▼                                        ▼
//!       ┌──────────────────────────────────────────────┐
//!       │ tmpfs / hugetlbfs file:  [header][ring bytes] │
//!       └──────────────────────────────────────────────┘
//! ```
//!
//! The ring's data pages are mapped **twice** at adjacent virtual
//! addresses, so any `n ≤ capacity` bytes starting anywhere in the ring
//! form one contiguous slice — wrap-around never splits a buffer. Both
//! `push` and `pop` are zero-copy two-phase operations: reserve a byte
//! range, write (or read) it in place, then commit how much was actually
//! used.
//!
//! # Usage
//!
//! Producer side:
//!
//! ```ignore
//! use chute::{CreateOptions, Producer};
//!
//! let mut tx = Producer::create("sensor-feed", 1 << 20, &CreateOptions::default())?;
//! let buf = tx.push(8)?;               // reserve 8 contiguous bytes
//! buf.copy_from_slice(&42u64.to_le_bytes());
//! tx.commit(8);                        // publish them
//! ```
//!
//! Consumer side:
//!
//! ```ignore
//! use chute::{Consumer, OpenOptions, PopResult};
//! use std::time::Duration;
//!
//! let mut rx = Consumer::open_blocking("sensor-feed", &OpenOptions::default(),
//!                                      Duration::from_secs(1))?;
//! loop {
//!     let n = match rx.pop() {
//!         PopResult::Bytes(bytes) => {
//!             // ... use bytes in place ...
//!             bytes.len()
//!         }
//!         PopResult::Empty => {
//!             std::hint::spin_loop();
//!             continue;
//!         }
//!         PopResult::Eof => break,
//!     };
//!     rx.commit(n);
//! }
//! ```
//!
//! # Requirements
//!
//! Linux/x86_64 only. The backing directory must live on tmpfs (the
//! default, `/dev/shm`) or on a hugetlbfs mount exposing 2 MiB or 1 GiB
//! pages. The ring capacity must be a power of two and a multiple of the
//! filesystem's page size. Consumers that observe an empty ring are
//! expected to spin (or apply their own backoff); the queue itself never
//! blocks and never wakes anyone.

pub mod affinity;
pub mod error;
pub mod layout;
pub mod ring;
pub mod sync;

mod consumer;
mod producer;
mod segment;

pub use consumer::{Consumer, PopResult};
pub use error::{Error, Result};
pub use layout::{HEADER_SIZE, MIN_CAPACITY, NAME_MAX, RingHeader, VERSION};
pub use producer::Producer;
pub use ring::{RingFull, RingStatus};
pub use segment::{CreateOptions, DEFAULT_DIR, OpenOptions};

#[cfg(all(test, loom))]
mod loom_tests;

//! Atomics indirection so the index protocol can run under loom.
//!
//! Everything that touches the shared header goes through these re-exports;
//! building with `--cfg loom` swaps in loom's model-checked equivalents.

#[cfg(not(loom))]
pub use core::sync::atomic::{AtomicU64, Ordering};
#[cfg(loom)]
pub use loom::sync::atomic::{AtomicU64, Ordering};

#[cfg(loom)]
pub use loom::thread;
#[cfg(all(not(loom), test))]
pub use std::thread;

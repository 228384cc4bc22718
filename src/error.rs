//! Crate error type and syscall plumbing.

use std::fmt;
use std::io;

/// Errors surfaced by endpoint construction and teardown.
///
/// The hot path (`push`/`pop`/`commit`) performs no syscalls and reports
/// flow control through [`crate::RingFull`] and [`crate::PopResult`]
/// instead; nothing in this enum can occur in steady state.
#[derive(Debug)]
pub enum Error {
    /// The ring name exceeds the 127-byte limit.
    NameTooLong { len: usize },
    /// Capacity is not a power of two, below the minimum, or not a
    /// multiple of the backing filesystem's page size.
    InvalidCapacity { capacity: u64, page_size: u64 },
    /// The backing directory is not on tmpfs or hugetlbfs.
    NotARamFs { fs_magic: i64 },
    /// The segment header carries an ABI version this crate doesn't speak.
    UnsupportedVersion { version: u64 },
    /// `open_blocking` exhausted its deadline without a successful open.
    Timeout,
    /// Operating-system error, errno preserved.
    Io(io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NameTooLong { len } => {
                write!(f, "ring name is {len} bytes, limit is {}", crate::NAME_MAX - 1)
            }
            Error::InvalidCapacity {
                capacity,
                page_size,
            } => write!(
                f,
                "capacity {capacity} is not a power-of-two multiple of the \
                 {page_size}-byte page size (minimum {})",
                crate::MIN_CAPACITY
            ),
            Error::NotARamFs { fs_magic } => write!(
                f,
                "directory is not on a RAM-backed filesystem (f_type {fs_magic:#x}, \
                 expected tmpfs or hugetlbfs)"
            ),
            Error::UnsupportedVersion { version } => {
                write!(f, "segment ABI version {version}, expected {}", crate::VERSION)
            }
            Error::Timeout => write!(f, "timed out waiting for the ring to appear"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Run a syscall returning `-1` on failure, retrying on `EINTR`.
///
/// Returns the syscall's non-negative result. Every blocking-capable
/// syscall in this crate goes through here so interrupts never escape.
pub(crate) fn retry_eintr<F>(mut syscall: F) -> io::Result<libc::c_int>
where
    F: FnMut() -> libc::c_int,
{
    loop {
        let rc = syscall();
        if rc >= 0 {
            return Ok(rc);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

//! Segment lifecycle: the file-backed, double-mapped shared region.
//!
//! The producer creates a ring as an *unlinked* `O_TMPFILE` file on a
//! RAM-backed filesystem, sizes it, builds the triple mapping, initializes
//! the header, and only then links the descriptor into the directory under
//! the caller's name. The existence of the name is the "ready" signal: a
//! consumer that can open it is guaranteed a fully-formed header.
//!
//! Virtual layout of the mapping, for capacity `C` and page size `P`:
//!
//! ```text
//! V ............. V+P-1        header page        (file offset 0)
//! V+P ........... V+P+C-1      ring               (file offset P)
//! V+P+C ......... V+P+2C-1     ring, same pages   (file offset P)
//! ```
//!
//! The second ring mapping is what makes wrap-around invisible: any index
//! into the first mapping can be read or written `n ≤ C` bytes forward
//! without leaving mapped memory, and the bytes past the boundary land at
//! the start of the ring.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::PathBuf;
use std::ptr::{self, NonNull};

use crate::error::{Error, Result, retry_eintr};
use crate::layout::{HEADER_SIZE, MIN_CAPACITY, NAME_MAX, RingHeader, VERSION};
use crate::ring::RawRing;

/// Default backing directory: tmpfs on every stock Linux.
pub const DEFAULT_DIR: &str = "/dev/shm";

/// Producer-side creation parameters.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Directory the ring is published into. Must be on tmpfs or
    /// hugetlbfs.
    pub dir: PathBuf,
    /// Mode bits for the ring file.
    pub mode: u32,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_DIR),
            mode: 0o600,
        }
    }
}

/// Consumer-side open parameters.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Directory the ring was published into.
    pub dir: PathBuf,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_DIR),
        }
    }
}

/// An established triple mapping plus the handles needed to retire it.
///
/// The producer keeps the directory handle for its whole lifetime and
/// unlinks the name on drop; the consumer keeps neither.
#[derive(Debug)]
pub(crate) struct Segment {
    map: Mapping,
    page_size: u64,
    capacity: u64,
    /// Producer side only: unlink `name` from `dir` on drop.
    published: Option<Published>,
}

#[derive(Debug)]
struct Published {
    dir: OwnedFd,
    name: CString,
}

impl Segment {
    /// Create, initialize, and publish a new ring (producer side).
    pub(crate) fn create(name: &str, capacity: u64, opts: &CreateOptions) -> Result<Segment> {
        let name_c = ring_name(name)?;
        let dir = open_dir(&opts.dir)?;
        let page_size = ram_fs_page_size(dir.as_raw_fd())?;
        validate_capacity(capacity, page_size)?;

        // Anonymous until step "publish": invisible to consumers while we
        // size, map, and initialize it.
        let fd = retry_eintr(|| unsafe {
            libc::openat(
                dir.as_raw_fd(),
                c".".as_ptr(),
                libc::O_TMPFILE | libc::O_RDWR | libc::O_CLOEXEC,
                opts.mode as libc::c_uint,
            )
        })
        .map_err(Error::Io)?;
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let file_len = page_size + capacity;
        retry_eintr(|| unsafe { libc::ftruncate(fd.as_raw_fd(), file_len as libc::off_t) })
            .map_err(Error::Io)?;

        let map = Mapping::establish(fd.as_raw_fd(), capacity, page_size, libc::PROT_WRITE)?;

        // Fault the data pages in now so the first hot-path write never
        // stalls on page allocation.
        unsafe {
            libc::madvise(
                map.base.as_ptr() as *mut libc::c_void,
                map.len,
                libc::MADV_WILLNEED,
            );
            ptr::write_bytes(map.base.as_ptr().add(page_size as usize), 0, capacity as usize);
        }

        unsafe { RingHeader::init(map.base.as_ptr() as *mut RingHeader, capacity, page_size) };

        // Publish: linking the descriptor into the directory is the one
        // atomic step that makes the fully-initialized ring visible.
        let proc_path = CString::new(format!("/proc/self/fd/{}", fd.as_raw_fd()))
            .expect("fd path has no interior NUL");
        retry_eintr(|| unsafe {
            libc::linkat(
                libc::AT_FDCWD,
                proc_path.as_ptr(),
                dir.as_raw_fd(),
                name_c.as_ptr(),
                libc::AT_SYMLINK_FOLLOW,
            )
        })
        .map_err(Error::Io)?;
        drop(fd); // the mappings keep the file alive

        tracing::debug!(ring = name, capacity, page_size, "ring segment created");

        Ok(Segment {
            map,
            page_size,
            capacity,
            published: Some(Published { dir, name: name_c }),
        })
    }

    /// Map an existing ring read-only (consumer side).
    pub(crate) fn open(name: &str, opts: &OpenOptions) -> Result<Segment> {
        let name_c = ring_name(name)?;
        let dir = open_dir(&opts.dir)?;
        let page_size = ram_fs_page_size(dir.as_raw_fd())?;

        let fd = retry_eintr(|| unsafe {
            libc::openat(
                dir.as_raw_fd(),
                name_c.as_ptr(),
                libc::O_RDWR | libc::O_CLOEXEC,
            )
        })
        .map_err(Error::Io)?;
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        drop(dir); // only needed for path resolution

        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        retry_eintr(|| unsafe { libc::fstat(fd.as_raw_fd(), &mut st) }).map_err(Error::Io)?;
        let file_len = st.st_size as u64;
        let capacity = file_len.saturating_sub(page_size);
        validate_capacity(capacity, page_size)?;

        // Ring mappings are read-only on this side; the header page stays
        // writable because the consumer owns `tail`.
        let map = Mapping::establish(fd.as_raw_fd(), capacity, page_size, 0)?;
        drop(fd);

        let header = unsafe { &*(map.base.as_ptr() as *const RingHeader) };
        if header.version != VERSION {
            return Err(Error::UnsupportedVersion {
                version: header.version,
            });
        }
        if header.capacity != capacity || header.validate().is_err() {
            return Err(Error::InvalidCapacity {
                capacity: header.capacity,
                page_size: header.page_size,
            });
        }

        tracing::debug!(ring = name, capacity, page_size, "ring segment opened");

        Ok(Segment {
            map,
            page_size,
            capacity,
            published: None,
        })
    }

    #[inline]
    pub(crate) fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Raw protocol view over this mapping.
    pub(crate) fn raw_ring(&self) -> RawRing {
        let header = self.map.base.cast::<RingHeader>();
        let data = unsafe {
            NonNull::new_unchecked(self.map.base.as_ptr().add(self.page_size as usize))
        };
        unsafe { RawRing::from_raw(header, data) }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if let Some(published) = &self.published {
            let rc = unsafe {
                libc::unlinkat(published.dir.as_raw_fd(), published.name.as_ptr(), 0)
            };
            if rc != 0 {
                tracing::warn!(
                    ring = %published.name.to_string_lossy(),
                    error = %io::Error::last_os_error(),
                    "failed to unlink ring name"
                );
            } else {
                tracing::debug!(
                    ring = %published.name.to_string_lossy(),
                    "ring segment retired"
                );
            }
        }
        // Field drops then unmap the range and close the directory handle,
        // in that order (declaration order: `map` before `published`).
    }
}

/// The reserved address range and its three fixed mappings.
#[derive(Debug)]
struct Mapping {
    base: NonNull<u8>,
    len: usize,
}

impl Mapping {
    /// Reserve `page_size + 2 * capacity` of address space, then place the
    /// header and the two ring views at fixed offsets inside it.
    ///
    /// `data_prot_extra` is OR-ed into `PROT_READ` for the two ring
    /// mappings (`PROT_WRITE` on the producer side, nothing on the
    /// consumer side).
    fn establish(
        fd: RawFd,
        capacity: u64,
        page_size: u64,
        data_prot_extra: libc::c_int,
    ) -> Result<Mapping> {
        let page = page_size as usize;
        let cap = capacity as usize;
        let len = page + 2 * cap;
        let huge = huge_flags(page_size);

        // Address-space reservation only: no permissions, no pages.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | huge,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        let map = Mapping {
            base: NonNull::new(base as *mut u8).expect("mmap returned a non-null mapping"),
            len,
        };

        let file_flags = libc::MAP_SHARED | libc::MAP_FIXED | huge;
        unsafe {
            // Header page, always writable: the consumer stores `tail`.
            map.map_fixed(0, page, libc::PROT_READ | libc::PROT_WRITE, file_flags, fd, 0)?;
            // The ring, twice back to back, both views onto file offset
            // `page`. This is the double mapping.
            let data_prot = libc::PROT_READ | data_prot_extra;
            map.map_fixed(page, cap, data_prot, file_flags, fd, page as libc::off_t)?;
            map.map_fixed(page + cap, cap, data_prot, file_flags, fd, page as libc::off_t)?;
        }
        Ok(map)
    }

    /// One fixed-address file mapping inside the reservation.
    ///
    /// # Safety
    ///
    /// `offset + len` must lie within the reservation.
    unsafe fn map_fixed(
        &self,
        offset: usize,
        len: usize,
        prot: libc::c_int,
        flags: libc::c_int,
        fd: RawFd,
        file_offset: libc::off_t,
    ) -> Result<()> {
        let want = unsafe { self.base.as_ptr().add(offset) };
        let got = unsafe {
            libc::mmap(want as *mut libc::c_void, len, prot, flags, fd, file_offset)
        };
        if got == libc::MAP_FAILED {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        debug_assert_eq!(got as *mut u8, want);
        Ok(())
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // One munmap retires the reservation and all three fixed mappings.
        unsafe { libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.len) };
    }
}

unsafe impl Send for Mapping {}

/// Validate and NUL-terminate a ring name.
fn ring_name(name: &str) -> Result<CString> {
    if name.len() >= NAME_MAX {
        return Err(Error::NameTooLong { len: name.len() });
    }
    CString::new(name)
        .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, "NUL in ring name")))
}

/// Path-only directory handle, kept by the producer for unlink-by-handle.
fn open_dir(dir: &std::path::Path) -> Result<OwnedFd> {
    let c_dir = CString::new(dir.as_os_str().as_encoded_bytes()).map_err(|_| {
        Error::Io(io::Error::new(io::ErrorKind::InvalidInput, "NUL in directory path"))
    })?;
    let fd = retry_eintr(|| unsafe {
        libc::open(
            c_dir.as_ptr(),
            libc::O_PATH | libc::O_DIRECTORY | libc::O_CLOEXEC,
        )
    })
    .map_err(Error::Io)?;
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Reject directories outside the two supported RAM-backed filesystems and
/// report the filesystem's natural page size (4 KiB tmpfs, 2 MiB or 1 GiB
/// hugetlbfs).
fn ram_fs_page_size(dirfd: RawFd) -> Result<u64> {
    let mut sfs: libc::statfs = unsafe { std::mem::zeroed() };
    retry_eintr(|| unsafe { libc::fstatfs(dirfd, &mut sfs) }).map_err(Error::Io)?;

    let magic = sfs.f_type as i64;
    if magic != libc::TMPFS_MAGIC as i64 && magic != libc::HUGETLBFS_MAGIC as i64 {
        return Err(Error::NotARamFs { fs_magic: magic });
    }
    Ok(sfs.f_bsize as u64)
}

fn validate_capacity(capacity: u64, page_size: u64) -> Result<()> {
    if capacity < MIN_CAPACITY
        || !capacity.is_power_of_two()
        || !capacity.is_multiple_of(page_size)
    {
        return Err(Error::InvalidCapacity {
            capacity,
            page_size,
        });
    }
    Ok(())
}

fn huge_flags(page_size: u64) -> libc::c_int {
    match page_size {
        0x20_0000 => libc::MAP_HUGETLB | libc::MAP_HUGE_2MB,
        0x4000_0000 => libc::MAP_HUGETLB | libc::MAP_HUGE_1GB,
        _ => 0,
    }
}

// HEADER_SIZE is referenced by layout; make sure the header page always
// holds it even on exotic page sizes.
const _: () = assert!(HEADER_SIZE <= 4096);

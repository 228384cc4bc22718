//! CPU pinning for the benchmark harnesses.
//!
//! The queue's latency numbers only hold when producer and consumer stay
//! on their own physical cores; both benchmark binaries pin themselves
//! with this before touching the ring.

use std::io;
use std::mem;

/// Pin the calling thread to a single CPU.
pub fn pin_current_thread(cpu: usize) -> io::Result<()> {
    unsafe {
        let mut set: libc::cpu_set_t = mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        if libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    tracing::debug!(cpu, "thread pinned");
    Ok(())
}

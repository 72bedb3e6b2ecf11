//! Attach handshake between the launching process and its forked tracer.
//!
//! The gate is a process-shared POSIX semaphore living in an anonymous
//! `MAP_SHARED` mapping, so it survives `fork` as the same object in both
//! processes. The tracer calls [`SyncGate::signal`] once attached; the
//! launcher blocks in [`SyncGate::wait_then_release`] before exec'ing.

use std::mem;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
use nix::sys::time::TimeSpec;
use nix::time::{clock_gettime, ClockId};

use crate::errors::GateError;

#[repr(C)]
struct Shared {
    sem: libc::sem_t,
    signaled: AtomicBool,
}

pub struct SyncGate {
    shared: NonNull<Shared>,
}

impl SyncGate {
    pub fn new() -> Result<Self, GateError> {
        let len = NonZeroUsize::new(mem::size_of::<Shared>()).ok_or(GateError::Map(Errno::EINVAL))?;
        // SAFETY: fresh anonymous mapping, no existing memory is aliased.
        let raw = unsafe {
            mmap_anonymous(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
            )
        }
        .map_err(GateError::Map)?;
        let shared = raw.cast::<Shared>();

        // SAFETY: the mapping is zero-filled, page aligned and large enough for Shared.
        let rc = unsafe {
            std::ptr::addr_of_mut!((*shared.as_ptr()).signaled).write(AtomicBool::new(false));
            libc::sem_init(std::ptr::addr_of_mut!((*shared.as_ptr()).sem), 1, 0)
        };
        if rc != 0 {
            let errno = Errno::last();
            // SAFETY: unmapping the region mapped above.
            unsafe {
                let _ = munmap(raw, len.get());
            }
            return Err(GateError::Init(errno));
        }
        Ok(SyncGate { shared })
    }

    fn sem(&self) -> *mut libc::sem_t {
        // SAFETY: shared stays mapped for the lifetime of self.
        unsafe { std::ptr::addr_of_mut!((*self.shared.as_ptr()).sem) }
    }

    fn flag(&self) -> &AtomicBool {
        // SAFETY: shared stays mapped for the lifetime of self.
        unsafe { &(*self.shared.as_ptr()).signaled }
    }

    /// Release the waiter. Only the first call posts.
    pub fn signal(&self) {
        if !self.flag().swap(true, Ordering::SeqCst) {
            // SAFETY: semaphore initialised in new().
            unsafe {
                libc::sem_post(self.sem());
            }
        }
    }

    pub fn is_signaled(&self) -> bool {
        self.flag().load(Ordering::SeqCst)
    }

    /// Block until signalled or `timeout` elapses, then release the mapping.
    /// Interrupted waits (the attach SIGSTOP) are resumed.
    ///
    /// The semaphore is destroyed only after a successful wait. On timeout or
    /// error the signaler may still post to it, so the mapping is just unmapped.
    pub fn wait_then_release(self, timeout: Duration) -> Result<(), GateError> {
        let result = self.wait(timeout);
        if result.is_ok() {
            // SAFETY: the one post has been consumed; nobody touches the semaphore again.
            unsafe {
                libc::sem_destroy(self.sem());
            }
        }
        result
    }

    fn wait(&self, timeout: Duration) -> Result<(), GateError> {
        let now = clock_gettime(ClockId::CLOCK_REALTIME).map_err(GateError::Wait)?;
        let deadline = now + TimeSpec::from_duration(timeout);
        loop {
            // SAFETY: semaphore initialised in new(); deadline outlives the call.
            let rc = unsafe { libc::sem_timedwait(self.sem(), deadline.as_ref()) };
            if rc == 0 {
                return Ok(());
            }
            match Errno::last() {
                Errno::EINTR => continue,
                Errno::ETIMEDOUT => return Err(GateError::Timeout(timeout)),
                errno => return Err(GateError::Wait(errno)),
            }
        }
    }
}

impl Drop for SyncGate {
    fn drop(&mut self) {
        // Unmap only; the semaphore may still be live in the other process.
        // SAFETY: mapping created in new() with this size.
        unsafe {
            let _ = munmap(self.shared.cast(), mem::size_of::<Shared>());
        }
    }
}

//! `EventFdNotifier` — default `Notifier` implementation (§4.10).
//!
//! Writes to an eventfd to wake whoever is waiting on new completions.
//! Coalescing is automatic: multiple `notify()` calls before the consumer
//! reads the eventfd collapse into a single wakeup (eventfd counter
//! semantics).

use std::os::unix::io::RawFd;

use ring_core::notifier::Notifier;

pub struct EventFdNotifier {
    fd: RawFd,
    owned: bool,
}

impl EventFdNotifier {
    /// Wrap an existing eventfd. The notifier does not close it on drop —
    /// ownership stays with the caller.
    pub fn new(eventfd: RawFd) -> Self {
        Self { fd: eventfd, owned: false }
    }

    /// Create a new eventfd (`EFD_NONBLOCK | EFD_CLOEXEC`) and own it.
    pub fn create() -> ring_core::error::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(ring_core::error::EngineError::Os(unsafe {
                *libc::__errno_location()
            }));
        }
        Ok(Self { fd, owned: true })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }
}

impl Notifier for EventFdNotifier {
    fn notify(&self) {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd,
                &val as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let errno = unsafe { *libc::__errno_location() };
            // EAGAIN means the counter would overflow, i.e. a wakeup is
            // already pending — not an error worth surfacing.
            if errno != libc::EAGAIN {
                eprintln!("ring-rt: eventfd notify failed: errno {errno}");
            }
        }
    }

    fn notify_fd(&self) -> Option<RawFd> {
        Some(self.fd)
    }
}

impl Drop for EventFdNotifier {
    fn drop(&mut self) {
        if self.owned && self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
            self.fd = -1;
        }
    }
}

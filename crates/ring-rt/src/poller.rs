//! `UringPoller` — default `ReadinessPoller` implementation (§4.5).
//!
//! Arms one-shot `IORING_OP_POLL_ADD` entries on a small, dedicated
//! `io_uring` instance used purely as a readiness primitive — not as the
//! engine's own submission/completion path (that's `SqRing`/`CqRing`).
//! This reuses the kernel's own readiness mechanism rather than
//! reimplementing edge-triggered polling over epoll.

use std::collections::HashMap;
use std::sync::Mutex;

use io_uring::{opcode, squeue, types, IoUring};

use ring_core::error::{EngineError, Result};
use ring_core::op::PollInterest;
use ring_core::poller::{PollArm, PollFired, ReadinessPoller};
use ring_core::request::RequestId;

fn poll_mask(interest: PollInterest) -> u32 {
    let mut mask = 0u32;
    if interest.readable {
        mask |= libc::POLLIN as u32;
    }
    if interest.writable {
        mask |= libc::POLLOUT as u32;
    }
    mask
}

struct Inner {
    ring: IoUring,
    /// Maps the io_uring user_data we stamped (the request id, widened) back
    /// to the fd, so a fired arm can be reported without the caller having
    /// to keep its own side table just for disarm bookkeeping.
    armed: HashMap<u32, i32>,
}

pub struct UringPoller {
    inner: Mutex<Inner>,
}

impl UringPoller {
    pub fn new(entries: u32) -> Result<Self> {
        let ring = IoUring::builder()
            .build(entries)
            .map_err(|e| EngineError::Os(e.raw_os_error().unwrap_or(-1)))?;
        Ok(Self {
            inner: Mutex::new(Inner {
                ring,
                armed: HashMap::new(),
            }),
        })
    }
}

impl ReadinessPoller for UringPoller {
    fn arm(&self, arm: PollArm) -> Result<()> {
        if arm.interest.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock().unwrap();
        let sqe: squeue::Entry = opcode::PollAdd::new(types::Fd(arm.fd), poll_mask(arm.interest))
            .build()
            .user_data(arm.request_id.0 as u64);
        unsafe {
            inner
                .ring
                .submission()
                .push(&sqe)
                .map_err(|_| EngineError::RingFull)?;
        }
        inner.ring.submit().map_err(|e| EngineError::Os(e.raw_os_error().unwrap_or(-1)))?;
        inner.armed.insert(arm.request_id.0, arm.fd);
        Ok(())
    }

    fn disarm(&self, request_id: RequestId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.armed.remove(&request_id.0).is_none() {
            return;
        }
        let sqe = opcode::PollRemove::new(request_id.0 as u64)
            .build()
            .user_data(u64::MAX);
        unsafe {
            // Best-effort: if the submission ring is momentarily full the
            // arm will still be cleaned up once it fires (or never fires
            // again because the fd closed), so a failed disarm isn't fatal.
            let _ = inner.ring.submission().push(&sqe);
        }
        let _ = inner.ring.submit();
    }

    fn drain_fired(&self, buf: &mut [PollFired]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let mut count = 0;
        let cq = inner.ring.completion();
        let mut fired = Vec::new();
        for cqe in cq {
            if cqe.user_data() == u64::MAX {
                continue; // PollRemove's own completion, not a readiness edge
            }
            let request_id = RequestId(cqe.user_data() as u32);
            let mask = cqe.result();
            fired.push(PollFired {
                request_id,
                readable: mask & (libc::POLLIN as i32) != 0,
                writable: mask & (libc::POLLOUT as i32) != 0,
            });
        }
        for f in fired {
            inner.armed.remove(&f.request_id.0);
            if count < buf.len() {
                buf[count] = f;
                count += 1;
            }
        }
        count
    }
}

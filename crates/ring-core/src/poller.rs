//! Readiness poller contract (§1, §4.5).
//!
//! The underlying mechanism that watches an fd for readability/writability
//! and reports back is explicitly out of scope (§1 calls it an external
//! collaborator) — this is the seam. The engine only needs to arm one
//! interest per request (bounded to two total per §4.5: readable and/or
//! writable) and later drain fired arms.
//!
//! # Implementors
//!
//! - `ring_rt::poller::UringPoller` (default): backed by a one-shot
//!   `IORING_OP_POLL_ADD` submitted to a small dedicated `io_uring`
//!   instance — the readiness primitive the kernel itself uses, reused
//!   here as the concrete backend rather than reimplemented over epoll.
//! - An epoll-backed poller for platforms/configurations that don't want
//!   a second ring just for readiness.

use crate::error::Result;
use crate::op::PollInterest;
use crate::request::RequestId;

/// One armed interest, keyed so a later `drain` can report which request
/// it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct PollArm {
    pub request_id: RequestId,
    pub fd: i32,
    pub interest: PollInterest,
}

/// A readiness edge that fired.
#[derive(Debug, Clone, Copy)]
pub struct PollFired {
    pub request_id: RequestId,
    pub readable: bool,
    pub writable: bool,
}

pub trait ReadinessPoller: Send + Sync {
    /// Arm one interest. Must not block. Returns `Err` if the poller's own
    /// capacity is exhausted (a resource limit distinct from SQ/CQ
    /// backpressure).
    fn arm(&self, arm: PollArm) -> Result<()>;

    /// Remove a previously armed interest, e.g. because the owning request
    /// was cancelled before its poll fired. A no-op if it already fired.
    fn disarm(&self, request_id: RequestId);

    /// Drain fired arms (non-blocking). Returns the number written into
    /// `buf`.
    fn drain_fired(&self, buf: &mut [PollFired]) -> usize;
}

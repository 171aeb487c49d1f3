//! Per-opcode handler contract (§4.4, §9 "Dynamic dispatch of opcodes").
//!
//! The concrete op set (read, write, accept, ...) is deliberately out of
//! scope (§1) — this module only defines the uniform contract every op
//! implements. `ring-ops` supplies a handful of concrete handlers for the
//! scenarios in §8; applications are free to register their own.

use crate::descriptor::SubmissionDescriptor;
use crate::error::Result;
use crate::request::Request;

/// Per-opcode capability flags (§4.4), fully enumerated at implementation
/// — this is the "subset" the design describes, which is all a pluggable
/// op set can fix ahead of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpCaps {
    bits: u16,
}

impl OpCaps {
    pub const NEEDS_FILE: u16 = 1 << 0;
    pub const NEEDS_FILE_NO_ERROR: u16 = 1 << 1;
    pub const SUPPORTS_POLL_READABLE: u16 = 1 << 2;
    pub const SUPPORTS_POLL_WRITABLE: u16 = 1 << 3;
    pub const MAY_BLOCK: u16 = 1 << 4;
    pub const LARGE_ASYNC_STATE: u16 = 1 << 5;
    pub const BUFFER_SELECT: u16 = 1 << 6;
    pub const HASH_BY_FILE: u16 = 1 << 7;
    pub const UNBOUND_NONREG_FILE: u16 = 1 << 8;

    pub const fn new(bits: u16) -> Self {
        Self { bits }
    }

    #[inline]
    pub fn has(self, bit: u16) -> bool {
        self.bits & bit != 0
    }

    pub fn may_block(self) -> bool {
        self.has(Self::MAY_BLOCK)
    }

    pub fn supports_poll(self) -> bool {
        self.has(Self::SUPPORTS_POLL_READABLE) || self.has(Self::SUPPORTS_POLL_WRITABLE)
    }

    /// The set of poll interests this op wants armed, bounded to two per
    /// §4.5 ("registers a secondary entry (bounded to two total)").
    pub fn poll_interests(self) -> PollInterest {
        PollInterest {
            readable: self.has(Self::SUPPORTS_POLL_READABLE),
            writable: self.has(Self::SUPPORTS_POLL_WRITABLE),
        }
    }
}

/// Which readiness edges a poll arm should watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollInterest {
    pub readable: bool,
    pub writable: bool,
}

impl PollInterest {
    pub fn is_empty(self) -> bool {
        !self.readable && !self.writable
    }
}

/// Outcome of an op's `prepare` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareStatus {
    Ok,
    /// Validation failed; the request should complete with this errno
    /// (negative) without ever being issued — a submission-time
    /// structural error per §7, which must have no side effects.
    Fail(i32),
}

/// Outcome of an op's (possibly repeated) `issue` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueStatus {
    /// Terminal: the op is done. Carries the completion result (negative
    /// errno, or a non-negative return value).
    Done(i32),
    /// Transient would-block. Never surfaced to the application (§7) —
    /// triggers a transition to POLL-ARMED or WORKER-QUEUED per §4.4.
    WouldBlock,
}

/// The uniform per-opcode contract (§4.4, §9).
///
/// `prepare` runs once, synchronously, from the submitting task's context.
/// `issue` may run twice: once with `force_nonblock = true` from the
/// inline path, and — if that returns `WouldBlock` and the op is not
/// pollable, or a poll wake fires — again with `force_nonblock = false`
/// from a worker thread, where blocking is allowed. `cleanup` always runs
/// exactly once, after the op reaches a terminal result, regardless of
/// which path got it there.
pub trait OpHandler: Send + Sync {
    /// Capability flags for this opcode. Queried once at engine `SETUP`
    /// to build the fixed capability table (§9 "Global state").
    fn caps(&self) -> OpCaps;

    /// Validate and import input. Runs inline, before the op is ever
    /// issued. Must not have side effects beyond populating
    /// `request.async_context` when `large_async_state` is set.
    fn prepare(&self, request: &mut Request, descriptor: &SubmissionDescriptor) -> PrepareStatus;

    /// Attempt the operation. `force_nonblock = true` on the first
    /// (inline) attempt; `false` once the op has moved to a worker.
    fn issue(&self, request: &mut Request, force_nonblock: bool) -> IssueStatus;

    /// Release any op-specific resources. Always called exactly once,
    /// after a terminal result is known, before the request is freed.
    fn cleanup(&self, request: &mut Request) {
        let _ = request;
    }
}

/// A process-wide, immutable-after-init table mapping opcode byte to
/// handler (§9 "Global state": "The op-descriptor table is process-wide
/// and immutable after init").
pub trait OpTable: Send + Sync {
    fn handler(&self, opcode: u8) -> Result<&dyn OpHandler>;

    /// Every opcode this table resolves, for `REGISTER(PROBE)` (§6): the
    /// application queries this once instead of trial-and-erroring each
    /// opcode it might want to use. Default returns nothing — a table
    /// backing only the three dispatcher-special-cased opcodes
    /// (`TIMEOUT`/`LINK_TIMEOUT`/`ASYNC_CANCEL`) has no `OpHandler`s of
    /// its own to report.
    fn supported_opcodes(&self) -> Vec<u8> {
        Vec::new()
    }
}

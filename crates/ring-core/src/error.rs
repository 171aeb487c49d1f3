//! Engine error types.
//!
//! Structural/setup errors only. Per-operation results (EIO, ENOSPC, ...)
//! never appear here — they travel exclusively in `CompletionEntry::result`
//! as negative errno values, per the error-handling design.

use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    /// A ring (SQ or CQ) is full.
    RingFull,
    /// The submit ring rejected an index outside `0..sq_ring_entries`.
    /// `dropped` mirrors the running `sq_dropped` counter at the time.
    SubmitQueueFull { dropped: u32 },
    /// The request pool's bulk allocator, one-at-a-time fallback, and
    /// singleton fallback request are all exhausted.
    PoolExhausted,
    /// Opcode has no registered `OpHandler`.
    Unsupported(u8),
    /// Submission descriptor opcode byte doesn't name a known opcode.
    BadOpcode(u8),
    /// Submission flags combination is invalid (e.g. HARDLINK without LINK
    /// on a non-tail member, or DRAIN on a descriptor also marked as its
    /// own linked timeout).
    BadFlags(u8),
    /// Fixed-file or fixed-buffer slot index out of range.
    SlotOutOfRange(u16),
    /// Worker pool is shut down or its bounded queue is full.
    WorkerUnavailable,
    /// Cancellation matcher found no matching in-flight request.
    NotFound,
    /// mmap of the shared-ring region failed.
    MmapFailed(i32),
    /// Raw OS error (errno).
    Os(i32),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RingFull => write!(f, "ring full"),
            Self::SubmitQueueFull { dropped } => {
                write!(f, "submit queue full ({dropped} entries dropped)")
            }
            Self::PoolExhausted => write!(f, "request pool exhausted"),
            Self::Unsupported(op) => write!(f, "no handler registered for opcode {op}"),
            Self::BadOpcode(op) => write!(f, "unknown opcode {op}"),
            Self::BadFlags(flags) => write!(f, "invalid submission flags {flags:#04x}"),
            Self::SlotOutOfRange(slot) => write!(f, "resource slot {slot} out of range"),
            Self::WorkerUnavailable => write!(f, "worker pool unavailable"),
            Self::NotFound => write!(f, "not found"),
            Self::MmapFailed(e) => write!(f, "mmap failed: errno {e}"),
            Self::Os(e) => write!(f, "OS error: errno {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

pub type Result<T> = std::result::Result<T, EngineError>;

//! Completion entry format and delivery abstraction.
//!
//! A `CompletionSink` writes completion entries into the CQ and notifies
//! the application. The default impl (`ring_rt::completion::CompletionPath`)
//! writes to the mmap'd CQ ring plus an overflow spill list, and signals
//! via eventfd.

use crate::descriptor::UserData;
use crate::error::Result;

/// Completion flags — the 32-bit `flags` field of a `CompletionEntry`.
pub mod comp_flags {
    /// More completions for this `user_data` are coming (multishot ops).
    pub const MORE: u32 = 1 << 0;
    /// This completion's buffer came from a provided-buffer pool; the
    /// high bits of `flags` carry the buffer id.
    pub const BUFFER: u32 = 1 << 1;
}

/// A fixed-size completion entry, as described at §3/§6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct CompletionEntry {
    pub user_data: u64,
    pub result: i32,
    pub flags: u32,
}

impl CompletionEntry {
    pub fn new(user_data: UserData, result: i32, flags: u32) -> Self {
        Self {
            user_data: user_data.0,
            result,
            flags,
        }
    }

    #[inline]
    pub fn user_data(&self) -> UserData {
        UserData(self.user_data)
    }
}

const _: () = assert!(std::mem::size_of::<CompletionEntry>() == 16);

/// Writes completions and notifies the consumer.
///
/// # Implementors
///
/// - `CompletionPath` (default, in `ring-rt`): writes to the mmap'd CQ
///   ring, spills to an internal overflow list when the ring is full,
///   signals via an `Notifier`. Batches notifications — one signal per
///   dispatcher-loop iteration, not per completion.
pub trait CompletionSink: Send + Sync {
    /// Write a single completion. May be buffered until `flush_and_notify`.
    ///
    /// Per the data-model invariant, this must never fail to accept a
    /// completion outright — when the CQ ring itself is full the
    /// implementation spills onto its bounded overflow list and bumps the
    /// `cq_overflow` counter. `Err` is reserved for the (bounded) overflow
    /// list itself being exhausted.
    fn push(&self, user_data: UserData, result: i32, flags: u32) -> Result<()>;

    /// Write a batch of completions. Default: calls `push` in a loop.
    fn push_batch(&self, entries: &[CompletionEntry]) -> Result<usize> {
        let mut count = 0;
        for entry in entries {
            self.push(entry.user_data(), entry.result, entry.flags)?;
            count += 1;
        }
        Ok(count)
    }

    /// Flush any buffered completions and notify the consumer.
    /// Called once per dispatcher-loop iteration, not per completion —
    /// each batched commit still issues a single release-store to the
    /// CQ tail for the whole batch.
    fn flush_and_notify(&self) -> Result<()>;

    /// Current value of the `cq_overflow` counter (§4.1, §8 law 3/4 analog).
    fn overflow_count(&self) -> u32;

    /// Whether the CQ_OVERFLOW flag is currently set.
    fn overflow_flag(&self) -> bool;
}

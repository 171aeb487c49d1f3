//! Worker pool abstraction (§4.6) — executes ops that cannot complete
//! inline, with bounded concurrency and optional per-key serialization.
//!
//! # Implementors
//!
//! - `ring_rt::worker::WorkerPool` (default): spawns
//!   `min(sq_capacity, 4 * available_parallelism)` bounded-group threads
//!   plus a small unbounded group for ops that may wait long periods
//!   (`unbound_nonreg_file`). Workers sharing a hash key (e.g. "same
//!   regular file") execute serially relative to each other.

use crate::request::RequestId;

/// A completed worker operation.
#[derive(Debug, Clone, Copy)]
pub struct WorkerCompletion {
    pub request_id: RequestId,
    pub result: i32,
}

/// Groups work items that must serialize with each other (e.g. all writes
/// to the same regular file). `None` means "no serialization required."
pub type HashKey = Option<u64>;

/// A unit of worker-thread work: re-enters the op's `issue` step with
/// blocking allowed, and reports the terminal result.
pub trait WorkerTask: Send {
    fn run(self: Box<Self>) -> WorkerCompletion;
}

impl<F> WorkerTask for F
where
    F: FnOnce() -> WorkerCompletion + Send,
{
    fn run(self: Box<Self>) -> WorkerCompletion {
        (*self)()
    }
}

/// Executes ops that cannot complete inline, on a pool of threads.
///
/// **Contract:**
/// - `enqueue`/`enqueue_unbounded` must never block the caller. If the
///   pool is full, they return `Err(WorkerUnavailable)` and the caller
///   falls back to completing the request inline with a failure (§9,
///   the "worker-submit race" open question).
/// - Workers may block arbitrarily inside a task's `run` (that's the
///   point).
/// - Completed results are collected via `poll_completions`.
pub trait WorkerPool: Send + Sync {
    /// Enqueue onto the bounded group, optionally serialized by
    /// `hash_key` against other tasks sharing the same key.
    fn enqueue(
        &self,
        hash_key: HashKey,
        task: Box<dyn WorkerTask>,
    ) -> crate::error::Result<()>;

    /// Enqueue onto the unbounded group (for `unbound_nonreg_file` ops
    /// that may wait indefinitely and must not starve the bounded group).
    fn enqueue_unbounded(&self, task: Box<dyn WorkerTask>) -> crate::error::Result<()>;

    /// Poll for completed worker operations (non-blocking). Returns the
    /// number of completions written into `buf`.
    fn poll_completions(&self, buf: &mut [WorkerCompletion]) -> usize;

    /// Number of bounded-group workers currently executing.
    fn active_workers(&self) -> usize;

    /// Total bounded-group worker count (busy + idle).
    fn total_workers(&self) -> usize;

    /// Bounded-group capacity ceiling.
    fn max_workers(&self) -> usize;

    /// Gracefully shut down all workers (bounded and unbounded). Blocks
    /// until drained.
    fn shutdown(&self);
}

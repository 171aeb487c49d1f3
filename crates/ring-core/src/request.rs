//! The `Request` object — the engine's internal per-submission record.
//!
//! See §3 "Invariants": a request exists in exactly one of the states
//! below for as long as any subsystem holds a reference to it, and the
//! final refcount decrement to zero is what triggers free. No code may
//! ever observe `refcount == 0` on a live request.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU8, Ordering};

use crate::descriptor::{SubmitFlags, UserData};

/// Index into the request pool's slab. Requests are never heap-boxed
/// individually — the pool owns a slab and hands out indices, so pointers
/// never dangle and the pool can bulk-allocate/free (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u32);

/// Identifies the task (thread, green-thread, or syscall-caller context)
/// that submitted a request. Used for owning-task cancellation (§4.9) and
/// as the per-task batching key for pool free (§4.2) and the mailbox (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

/// The request lifecycle states from the §4.4 state-machine diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestState {
    Prepared = 0,
    Deferred = 1,
    InlineExecuting = 2,
    PollArmed = 3,
    WorkerQueued = 4,
    WorkerExecuting = 5,
    Completed = 6,
    AwaitingFree = 7,
}

impl RequestState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Prepared,
            1 => Self::Deferred,
            2 => Self::InlineExecuting,
            3 => Self::PollArmed,
            4 => Self::WorkerQueued,
            5 => Self::WorkerExecuting,
            6 => Self::Completed,
            7 => Self::AwaitingFree,
            other => panic!("invalid RequestState discriminant {other}"),
        }
    }
}

/// Atomic cell holding a `RequestState`. Every transition in §4.4 goes
/// through `compare_exchange` here, which is what makes "exists in exactly
/// one state" an enforced invariant rather than a comment.
pub struct RequestStateCell(AtomicU8);

impl RequestStateCell {
    pub fn new(initial: RequestState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn load(&self) -> RequestState {
        RequestState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Attempt the one legal transition `from -> to`. Returns `false` if
    /// another subsystem already moved the request to a different state
    /// (e.g. cancellation raced with a poll wake).
    pub fn transition(&self, from: RequestState, to: RequestState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Unconditionally set the state. Used only by the completion path,
    /// which reaches a request from at most one winning caller (guarded by
    /// `mark_completed_once`) and so has no competing transition to race.
    pub fn force(&self, to: RequestState) {
        self.0.store(to as u8, Ordering::Release);
    }
}

impl fmt::Debug for RequestStateCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.load())
    }
}

/// Owned, large per-op state allocated lazily when an op's capability
/// flags declare `large_async_state`, or synchronously at prepare time
/// otherwise. Opaque to the engine core — op handlers downcast their own
/// state back out. This is the engine's answer to the source's per-op
/// union (§9 "Per-op state union"): because op handlers are registered
/// externally (the concrete op set is out of scope, §1), a closed sum
/// type keyed by opcode isn't available to `ring-core` — `Box<dyn Any>`
/// plays the same role for a pluggable op set.
pub type AsyncContext = Box<dyn Any + Send>;

/// The engine's internal object tracking one accepted submission through
/// its lifecycle (§3).
pub struct Request {
    pub id: RequestId,
    pub opcode: u8,
    pub submit_flags: SubmitFlags,
    pub user_data: UserData,
    pub owning_task: TaskId,
    /// File descriptor this request targets, if any (`-1` otherwise).
    /// Held at the dispatcher level (not inside `async_context`) because
    /// arming the readiness poller (§4.5) is generic dispatcher behavior
    /// that must not depend on downcasting an opaque per-op state blob.
    pub fd: i32,

    state: RequestStateCell,
    /// Initial value 2: one ref for "submission accepted it", one for
    /// "a completion entry is still owed" (§3). A third, transient
    /// reference is taken for the duration of a live poll arm — see
    /// `retain_for_poll_arm`/`release_poll_arm_ref`.
    refcount: AtomicU32,
    result: AtomicI32,

    pub async_context: Option<AsyncContext>,

    /// The linked timeout attached to this request, if any (§4.8).
    pub timeout_link: Option<RequestId>,

    /// `true` while the readiness poller holds an outstanding arm for this
    /// request, i.e. the extra reference taken by `retain_for_poll_arm` has
    /// not yet been given back. Guards against double-releasing that
    /// reference if a poll wake and an explicit cancel/disarm race.
    poll_armed_ref: std::sync::atomic::AtomicBool,

    /// `true` once a completion entry has been produced for this request,
    /// enforcing "every request contributes exactly one completion entry".
    completed_once: std::sync::atomic::AtomicBool,

    /// `true` once this request has been re-issued inline after a poll
    /// wake (§4.4's "INLINE (again, may requeue once)"). A second
    /// `WouldBlock` unconditionally moves to WORKER-QUEUED regardless of
    /// pollability, so the dispatcher needs to tell a first inline
    /// attempt from a post-wake retry.
    poll_retried: std::sync::atomic::AtomicBool,

    /// Best-effort cancellation flag (§4.9, §5 "best-effort for in-flight
    /// workers"). Checked before a deferred/chain-pending/drain-pending
    /// request is actually dispatched, so a cancel that arrives before the
    /// request ever issues turns into an immediate `-ECANCELED` completion
    /// instead of a no-op. Once a request has reached `InlineExecuting` /
    /// `WorkerExecuting`, the flag is purely advisory — the op still runs
    /// to its real result.
    cancel_requested: std::sync::atomic::AtomicBool,
}

impl Request {
    pub fn new(
        id: RequestId,
        opcode: u8,
        submit_flags: SubmitFlags,
        user_data: UserData,
        owning_task: TaskId,
    ) -> Self {
        Self {
            id,
            opcode,
            submit_flags,
            user_data,
            owning_task,
            fd: -1,
            state: RequestStateCell::new(RequestState::Prepared),
            refcount: AtomicU32::new(2),
            result: AtomicI32::new(0),
            async_context: None,
            timeout_link: None,
            poll_armed_ref: std::sync::atomic::AtomicBool::new(false),
            completed_once: std::sync::atomic::AtomicBool::new(false),
            poll_retried: std::sync::atomic::AtomicBool::new(false),
            cancel_requested: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    /// Whether this request has already been re-issued inline once after a
    /// poll wake. A second `WouldBlock` after this is `true` moves
    /// unconditionally to WORKER-QUEUED regardless of pollability (§4.4).
    pub fn poll_retried(&self) -> bool {
        self.poll_retried.load(Ordering::Acquire)
    }

    /// Marks that this request has now had its post-wake inline retry.
    pub fn mark_poll_retried(&self) {
        self.poll_retried.store(true, Ordering::Release);
    }

    pub fn state(&self) -> &RequestStateCell {
        &self.state
    }

    pub fn result(&self) -> i32 {
        self.result.load(Ordering::Acquire)
    }

    pub fn set_result(&self, value: i32) {
        self.result.store(value, Ordering::Release);
    }

    /// Take an additional reference. Returns the new count.
    pub fn retain(&self) -> u32 {
        self.refcount.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop a reference. Returns the new count; the caller must free the
    /// request from the pool when this returns 0, and must never do so
    /// otherwise (§3's "no state may observe refcount == 0" invariant
    /// means nobody acts further on a request once this returns 0 except
    /// the one caller who observed it).
    pub fn release(&self) -> u32 {
        let prev = self.refcount.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "refcount underflow on request {:?}", self.id);
        prev - 1
    }

    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Acquire)
    }

    /// Take the extra reference a live poll arm holds on its request.
    /// Pairs with exactly one `release_poll_arm_ref` — called when the poll
    /// fires or when the arm is explicitly disarmed, whichever comes first.
    pub fn retain_for_poll_arm(&self) -> u32 {
        self.poll_armed_ref.store(true, Ordering::Release);
        self.retain()
    }

    /// Give back the poll arm's reference, if one is outstanding. Safe to
    /// call from both the wake path and the disarm path — only the first
    /// caller actually releases, since a poll can fire and be cancelled at
    /// the same moment.
    pub fn release_poll_arm_ref(&self) -> Option<u32> {
        if self.poll_armed_ref.swap(false, Ordering::AcqRel) {
            Some(self.release())
        } else {
            None
        }
    }

    /// Marks this request as having emitted its one completion entry.
    /// Returns `false` if it had already been marked — callers treat that
    /// as a bug (double completion), matching the "exactly one" invariant.
    pub fn mark_completed_once(&self) -> bool {
        !self.completed_once.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("opcode", &self.opcode)
            .field("state", &self.state)
            .field("refcount", &self.refcount())
            .field("user_data", &self.user_data)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Request {
        Request::new(
            RequestId(0),
            0,
            SubmitFlags::from_bits(0),
            UserData(42),
            TaskId(1),
        )
    }

    #[test]
    fn starts_with_refcount_two() {
        let r = fresh();
        assert_eq!(r.refcount(), 2);
    }

    #[test]
    fn state_transition_is_exclusive() {
        let r = fresh();
        assert!(r.state().transition(RequestState::Prepared, RequestState::InlineExecuting));
        // A stale `from` no longer matches — second racer loses.
        assert!(!r.state().transition(RequestState::Prepared, RequestState::PollArmed));
        assert_eq!(r.state().load(), RequestState::InlineExecuting);
    }

    #[test]
    fn completion_marked_exactly_once() {
        let r = fresh();
        assert!(r.mark_completed_once());
        assert!(!r.mark_completed_once());
    }

    #[test]
    fn retain_release_balance_to_zero() {
        let r = fresh();
        r.retain(); // 3
        assert_eq!(r.release(), 2);
        assert_eq!(r.release(), 1);
        assert_eq!(r.release(), 0);
    }
}

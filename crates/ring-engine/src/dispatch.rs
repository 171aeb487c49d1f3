//! The §4.4 dispatch/retry/defer/poll state machine.
//!
//! Two entry points drive everything here: [`accept_batch`] turns freshly
//! dequeued `SubmissionDescriptor`s into tracked `Request`s and gives each
//! its first turn (or defers it — drain barrier, chain successor, linked
//! timeout); [`drive_once`] is one pass of the dispatch loop, draining
//! whatever external event sources (readiness poller, worker pool, timeout
//! service) have work ready and flushing anything the defer queue is now
//! free to run.
//!
//! `TIMEOUT` and `ASYNC_CANCEL` are handled directly in [`run_one`] rather
//! than through a registered `OpHandler` — they drive the Timeout Service
//! and Cancellation Registry, not an I/O primitive. `LINK_TIMEOUT` is
//! handled even earlier, in [`accept_batch`] itself, because unlike an
//! ordinary chain successor it runs concurrently with its subject (a race
//! against the clock) rather than waiting for the subject to finish.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ring_core::cancel::{CancelMatcher, CancelOutcome};
use ring_core::completion::CompletionEntry;
use ring_core::descriptor::{SubmissionDescriptor, SubmitFlags, UserData};
use ring_core::error::Result;
use ring_core::op::{IssueStatus, OpCaps, PrepareStatus};
use ring_core::opcode;
use ring_core::poller::{PollArm, PollFired};
use ring_core::request::{RequestId, RequestState, TaskId};
use ring_core::worker::{HashKey, WorkerCompletion, WorkerTask};

use crate::engine::Engine;

/// Drain and dispatch one batch of freshly accepted descriptors (§4.4,
/// §4.7). Returns the number actually accepted into the request pool —
/// fewer than `descriptors.len()` only if the pool (including its
/// singleton fallback slot) is exhausted partway through, in which case
/// the remainder is left undispatched and the caller's next `enter` will
/// see them re-presented from the SQ (they were never dequeued from it in
/// the first place — `accept_batch` only sees what `drain_and_accept`
/// already pulled off the ring, so a short count here is purely a pool
/// capacity signal, not a lost submission).
pub(crate) fn accept_batch<F, Buf>(
    engine: &Arc<Engine<F, Buf>>,
    descriptors: &[SubmissionDescriptor],
    owning_task: TaskId,
) -> Result<u32>
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    let bulk = engine.pool.allocate_batch(
        descriptors.len(),
        |i| descriptors[i].opcode,
        |i| descriptors[i].flags(),
        |i| descriptors[i].user_data(),
        owning_task,
    );

    let mut ids: Vec<Option<RequestId>> = Vec::with_capacity(descriptors.len());
    for (i, result) in bulk.into_iter().enumerate() {
        match result {
            Ok(id) => ids.push(Some(id)),
            Err(_) => {
                let desc = &descriptors[i];
                let fallback = engine
                    .pool
                    .allocate_one(desc.opcode, desc.flags(), desc.user_data(), owning_task)
                    .or_else(|_| {
                        engine.pool.allocate_fallback(desc.opcode, desc.flags(), desc.user_data(), owning_task)
                    });
                ids.push(fallback.ok());
            }
        }
    }

    let mut submitted = 0u32;
    let mut prev: Option<(RequestId, SubmitFlags)> = None;

    for (i, maybe_id) in ids.into_iter().enumerate() {
        let id = match maybe_id {
            Some(id) => id,
            None => {
                // Pool exhausted even through the fallback slot — a
                // structural submission-time failure with no side effects
                // (§7). Stop accepting the rest of this batch.
                break;
            }
        };

        let desc = descriptors[i];
        let flags = desc.flags();

        engine.pool.with_request(id, |r| r.fd = desc.fd);
        store_pending(engine, id, desc);
        engine.cancels.track(id, owning_task, None, desc.user_data());
        engine.inflight.fetch_add(1, Ordering::AcqRel);
        submitted += 1;

        if desc.opcode == opcode::LINK_TIMEOUT {
            // Races its subject rather than waiting for it — never queued
            // behind anything, armed immediately (§4.8).
            match prev {
                Some((subject, _)) => arm_link_timeout(engine, id, subject, desc),
                None => handle_timeout_submit(engine, id, &desc, None),
            }
            prev = Some((id, flags));
            continue;
        }

        if let Some((prev_id, prev_flags)) = prev {
            if prev_flags.chains() {
                // Chain successor: starts only when `prev_id` completes
                // (§4.7). Its descriptor stays in `pending_descriptors`
                // until then.
                engine.links.link(prev_id, id, prev_flags);
                engine.pool.with_request(id, |r| {
                    r.state().transition(RequestState::Prepared, RequestState::Deferred);
                });
                prev = Some((id, flags));
                continue;
            }
        }

        dispatch_new_entry(engine, id, owning_task);
        prev = Some((id, flags));
    }

    Ok(submitted)
}

/// Decide whether a request that's free to take its first turn runs now
/// or waits behind the drain barrier (§4.7, §9 open question #1).
fn dispatch_new_entry<F, Buf>(engine: &Arc<Engine<F, Buf>>, id: RequestId, owning_task: TaskId)
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    let is_drain = peek_pending(engine, id).map(|d| d.flags().is_drain()).unwrap_or(false);

    if is_drain {
        // "Before" set: everything accepted strictly before this
        // submission (the submission itself included in the caller's
        // inflight count already) must have fully drained first.
        if engine.inflight.load(Ordering::Acquire) > 1 || engine.draining.load(Ordering::Acquire) {
            engine.draining.store(true, Ordering::Release);
            defer(engine, id);
            return;
        }
        engine.draining.store(true, Ordering::Release);
        engine.drain_owner.store(id.0, Ordering::Release);
        run_one(engine, id, owning_task);
        return;
    }

    if engine.draining.load(Ordering::Acquire) {
        // Part of the "after" set of an in-progress drain barrier.
        defer(engine, id);
        return;
    }

    run_one(engine, id, owning_task);
}

fn defer<F, Buf>(engine: &Arc<Engine<F, Buf>>, id: RequestId)
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    engine.pool.with_request(id, |r| {
        r.state().transition(RequestState::Prepared, RequestState::Deferred);
    });
    engine.defer_queue.lock().unwrap().push_back(id);
}

/// Give a request its first dispatch turn: resolve its descriptor,
/// special-case `TIMEOUT`/`ASYNC_CANCEL`, otherwise run `prepare` and the
/// first inline `issue` attempt (§4.4).
fn run_one<F, Buf>(engine: &Arc<Engine<F, Buf>>, id: RequestId, owning_task: TaskId)
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    let desc = match take_pending(engine, id) {
        Some(d) => d,
        None => return,
    };

    engine.pool.with_request(id, |r| {
        r.state().transition(RequestState::Deferred, RequestState::Prepared);
    });

    if engine.pool.with_request(id, |r| r.is_cancel_requested()).unwrap_or(false) {
        complete_request(engine, id, -libc::ECANCELED);
        return;
    }

    let opcode = desc.opcode;
    if opcode == opcode::TIMEOUT {
        handle_timeout_submit(engine, id, &desc, None);
        return;
    }
    if opcode == opcode::ASYNC_CANCEL {
        handle_async_cancel(engine, id, &desc, owning_task);
        return;
    }

    let handler = match engine.ops.handler(opcode) {
        Ok(h) => h,
        Err(_) => {
            complete_request(engine, id, -libc::EINVAL);
            return;
        }
    };
    let caps = handler.caps();

    let prep = engine.pool.with_request(id, |r| handler.prepare(r, &desc));
    match prep {
        None => return,
        Some(PrepareStatus::Fail(errno)) => {
            complete_request(engine, id, errno);
            return;
        }
        Some(PrepareStatus::Ok) => {}
    }

    if caps.may_block() {
        queue_to_worker(engine, id, opcode, caps);
        return;
    }

    engine.pool.with_request(id, |r| {
        r.state().transition(RequestState::Prepared, RequestState::InlineExecuting);
    });
    let status = issue_once(engine, id, opcode, true);
    handle_issue_status(engine, id, opcode, caps, status);
}

/// Interpret the result of an `issue` attempt: commit a terminal result,
/// arm the readiness poller for a retry, or fall through to a worker
/// thread (§4.4, §4.5).
fn handle_issue_status<F, Buf>(
    engine: &Arc<Engine<F, Buf>>,
    id: RequestId,
    opcode: u8,
    caps: OpCaps,
    status: Option<IssueStatus>,
) where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    match status {
        None => {}
        Some(IssueStatus::Done(result)) => {
            run_cleanup(engine, id, opcode);
            complete_request(engine, id, result);
        }
        Some(IssueStatus::WouldBlock) => {
            let already_retried = engine.pool.with_request(id, |r| r.poll_retried()).unwrap_or(true);
            if caps.supports_poll() && !already_retried {
                let fd = engine.pool.with_request(id, |r| r.fd).unwrap_or(-1);
                let interest = caps.poll_interests();
                let armed = engine
                    .pool
                    .with_request(id, |r| {
                        r.state().transition(RequestState::InlineExecuting, RequestState::PollArmed)
                    })
                    .unwrap_or(false);
                if armed {
                    if engine.poller.arm(PollArm { request_id: id, fd, interest }).is_err() {
                        // Poller capacity exhausted — fall back to a
                        // worker thread instead of stranding the request.
                        engine.pool.with_request(id, |r| {
                            r.state().transition(RequestState::PollArmed, RequestState::InlineExecuting)
                        });
                        queue_to_worker(engine, id, opcode, caps);
                    } else {
                        // The poller now holds a reference to this request
                        // until it fires or is explicitly disarmed.
                        engine.pool.with_request(id, |r| r.retain_for_poll_arm());
                    }
                }
                return;
            }
            queue_to_worker(engine, id, opcode, caps);
        }
    }
}

/// A readiness edge fired for a `PollArmed` request: re-enter `issue`
/// inline once more, then handle whatever it returns exactly as the first
/// attempt would (§4.4's "INLINE (again, may requeue once)").
pub(crate) fn on_poll_fired<F, Buf>(engine: &Arc<Engine<F, Buf>>, fired: PollFired)
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    let id = fired.request_id;
    let moved = engine
        .pool
        .with_request(id, |r| {
            r.mark_poll_retried();
            r.state().transition(RequestState::PollArmed, RequestState::InlineExecuting)
        })
        .unwrap_or(false);
    if !moved {
        // Cancelled or freed before the wake arrived.
        return;
    }
    // The wake consumes the poller's outstanding reference.
    engine.pool.with_request(id, |r| r.release_poll_arm_ref());

    let opcode = match engine.pool.with_request(id, |r| r.opcode) {
        Some(o) => o,
        None => return,
    };
    let caps = match engine.ops.handler(opcode) {
        Ok(h) => h.caps(),
        Err(_) => {
            complete_request(engine, id, -libc::EINVAL);
            return;
        }
    };
    let status = issue_once(engine, id, opcode, true);
    handle_issue_status(engine, id, opcode, caps, status);
}

/// Hand a request to the worker pool. `hash_by_file` ops are serialized
/// against others sharing the same fd; `unbound_nonreg_file` ops go to
/// the unbounded group instead of the fixed-size bounded one (§4.6).
fn queue_to_worker<F, Buf>(engine: &Arc<Engine<F, Buf>>, id: RequestId, opcode: u8, caps: OpCaps)
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    let hash_key: HashKey = if caps.has(OpCaps::HASH_BY_FILE) {
        engine.pool.with_request(id, |r| r.fd as u64)
    } else {
        None
    };

    let engine_arc = match engine.self_weak.upgrade() {
        Some(a) => a,
        None => {
            complete_request(engine, id, -libc::ECANCELED);
            return;
        }
    };

    let task: Box<dyn WorkerTask> = Box::new(move || {
        engine_arc.pool.with_request(id, |r| {
            r.state().transition(RequestState::WorkerQueued, RequestState::WorkerExecuting)
        });
        let status = issue_once(&engine_arc, id, opcode, false);
        let result = match status {
            Some(IssueStatus::Done(result)) => result,
            Some(IssueStatus::WouldBlock) => -libc::EAGAIN,
            None => -libc::ECANCELED,
        };
        run_cleanup(&engine_arc, id, opcode);
        WorkerCompletion { request_id: id, result }
    });

    let enqueue_result =
        if caps.has(OpCaps::UNBOUND_NONREG_FILE) { engine.workers.enqueue_unbounded(task) } else { engine.workers.enqueue(hash_key, task) };

    match enqueue_result {
        Ok(()) => {
            engine.pool.with_request(id, |r| {
                if !r.state().transition(RequestState::InlineExecuting, RequestState::WorkerQueued) {
                    r.state().transition(RequestState::Prepared, RequestState::WorkerQueued);
                }
            });
        }
        Err(_) => {
            // §9 "worker-submit race": the bounded/unbounded group
            // rejected the task after the dispatch lock was released —
            // complete inline with a cancellation-class result rather
            // than leaving the request stranded.
            complete_request(engine, id, -libc::ECANCELED);
        }
    }
}

fn issue_once<F, Buf>(engine: &Engine<F, Buf>, id: RequestId, opcode: u8, force_nonblock: bool) -> Option<IssueStatus>
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    let handler = engine.ops.handler(opcode).ok()?;
    engine.pool.with_request(id, |r| handler.issue(r, force_nonblock))
}

fn run_cleanup<F, Buf>(engine: &Engine<F, Buf>, id: RequestId, opcode: u8)
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    if let Ok(handler) = engine.ops.handler(opcode) {
        engine.pool.with_request(id, |r| handler.cleanup(r));
    }
}

/// Commit a request's one and only completion entry (§3's "exactly one
/// completion" invariant, enforced via `mark_completed_once`), then chase
/// every downstream effect: release its linked timeout (if any), start or
/// cancel its chain successor (§4.7), release the drain barrier it may
/// own (§4.7), and free the request once both the submission and
/// completion references are gone.
fn complete_request<F, Buf>(engine: &Engine<F, Buf>, id: RequestId, result: i32)
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    let outcome = engine.pool.with_request(id, |r| {
        if !r.mark_completed_once() {
            return None;
        }
        r.set_result(result);
        r.state().force(RequestState::Completed);
        r.release_poll_arm_ref();
        r.release();
        let released = r.release();
        Some((r.user_data, r.timeout_link, r.owning_task, released))
    });

    let Some((user_data, timeout_link, owning_task, released)) = outcome.flatten() else {
        return;
    };

    engine.poller.disarm(id);
    engine.cancels.untrack(id);
    forget_pending(engine, id);
    engine.cq.push(CompletionEntry::new(user_data, result, 0));
    engine.notifier.notify();

    if let Some(t) = timeout_link {
        if engine.timeouts.cancel(t) {
            complete_request(engine, t, -libc::ECANCELED);
        }
    }

    // Chain successor, if `id` carried LINK or HARDLINK (§4.7). `LinkGraph`
    // is the sole source of truth for this — no pointer lives on `Request`
    // itself.
    if let Some(next_id) = engine.links.next_of(id) {
        let propagate_failure = result < 0 && engine.links.should_propagate_failure(id);
        engine.links.forget(id);
        if propagate_failure {
            complete_request(engine, next_id, -libc::ECANCELED);
        } else if let Some(arc) = engine.self_weak.upgrade() {
            dispatch_link_successor(&arc, next_id);
        }
    }

    if released == 0 {
        engine.pool.with_request(id, |r| r.state().force(RequestState::AwaitingFree));
        engine.pool.free(id, owning_task);
    }

    if engine.drain_owner.load(Ordering::Acquire) == id.0 {
        engine.draining.store(false, Ordering::Release);
        engine.drain_owner.store(u32::MAX, Ordering::Release);
    }

    engine.inflight.fetch_sub(1, Ordering::AcqRel);
}

fn dispatch_link_successor<F, Buf>(engine: &Arc<Engine<F, Buf>>, id: RequestId)
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    if let Some(owning_task) = engine.pool.with_request(id, |r| r.owning_task) {
        dispatch_new_entry(engine, id, owning_task);
    }
}

/// The §4.9 cancellation algorithm: pending timeout first (covers both a
/// timeout request cancelled directly and a subject racing its own linked
/// timeout), then poll-armed (disarm and complete), then deferred/chain-
/// pending (mark and, if still sitting in the defer queue, complete right
/// away rather than waiting on a flush that may never come), then
/// in-flight inline/worker execution (best-effort advisory flag only —
/// the op still runs to its real result, per §8 law 6).
fn try_cancel_request<F, Buf>(engine: &Engine<F, Buf>, id: RequestId) -> CancelOutcome
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    if engine.timeouts.cancel(id) {
        complete_request(engine, id, -libc::ECANCELED);
        return CancelOutcome::Initiated;
    }

    // Check live state before consulting the cancellation registry: a
    // request that already completed is untracked from the registry at
    // that point (`complete_request`), so `outcome_for` alone can't tell
    // "already done" apart from "never existed."
    let state = match engine.pool.with_request(id, |r| r.state().load()) {
        Some(s) => s,
        None => return CancelOutcome::NotFound,
    };

    match state {
        RequestState::Completed | RequestState::AwaitingFree => CancelOutcome::AlreadyDone,
        RequestState::PollArmed => {
            let moved = engine
                .pool
                .with_request(id, |r| r.state().transition(RequestState::PollArmed, RequestState::InlineExecuting))
                .unwrap_or(false);
            if moved {
                engine.poller.disarm(id);
                complete_request(engine, id, -libc::ECANCELED);
            }
            CancelOutcome::Initiated
        }
        RequestState::Prepared | RequestState::Deferred => {
            engine.pool.with_request(id, |r| r.request_cancel());
            let removed = {
                let mut dq = engine.defer_queue.lock().unwrap();
                if let Some(pos) = dq.iter().position(|qid| *qid == id) {
                    dq.remove(pos);
                    true
                } else {
                    false
                }
            };
            if removed {
                complete_request(engine, id, -libc::ECANCELED);
            }
            CancelOutcome::Initiated
        }
        RequestState::InlineExecuting | RequestState::WorkerQueued | RequestState::WorkerExecuting => {
            engine.pool.with_request(id, |r| r.request_cancel());
            CancelOutcome::Initiated
        }
    }
}

fn handle_async_cancel<F, Buf>(engine: &Arc<Engine<F, Buf>>, id: RequestId, desc: &SubmissionDescriptor, _owning_task: TaskId)
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    let target = UserData(desc.addr);
    let matches = engine.cancels.find_matches(CancelMatcher::ByUserData(target), &engine.links);
    let mut any = false;
    for target_id in matches {
        if target_id == id {
            continue;
        }
        if try_cancel_request(engine, target_id) == CancelOutcome::Initiated {
            any = true;
        }
    }
    let result = if any { 0 } else { -libc::ENOENT };
    complete_request(engine, id, result);
}

/// Register a `TIMEOUT`/`LINK_TIMEOUT` request with the Timeout Service.
/// `desc.off` doubles as the count-based target `N` (`0` means a pure
/// wall-clock timer); `desc.addr` doubles as a relative duration in
/// nanoseconds when `N == 0` — a marshaling stand-in, since per-op field
/// interpretation is otherwise out of scope (§1), documented in
/// `DESIGN.md`.
fn handle_timeout_submit<F, Buf>(engine: &Engine<F, Buf>, id: RequestId, desc: &SubmissionDescriptor, linked_to: Option<RequestId>)
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    let count = desc.off;
    if count > 0 {
        let target = engine.metrics.completions_issued().wrapping_add(count);
        engine.timeouts.register_count(id, target, linked_to);
    } else {
        let deadline = Instant::now() + Duration::from_nanos(desc.addr);
        engine.timeouts.register_wall_clock(id, deadline, linked_to);
    }
}

fn arm_link_timeout<F, Buf>(engine: &Engine<F, Buf>, id: RequestId, subject: RequestId, desc: SubmissionDescriptor)
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    engine.pool.with_request(subject, |r| r.timeout_link = Some(id));
    handle_timeout_submit(engine, id, &desc, Some(subject));
}

fn store_pending<F, Buf>(engine: &Engine<F, Buf>, id: RequestId, desc: SubmissionDescriptor)
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    engine.pending_descriptors.lock().unwrap().insert(id, desc);
}

fn take_pending<F, Buf>(engine: &Engine<F, Buf>, id: RequestId) -> Option<SubmissionDescriptor>
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    engine.pending_descriptors.lock().unwrap().remove(&id)
}

fn peek_pending<F, Buf>(engine: &Engine<F, Buf>, id: RequestId) -> Option<SubmissionDescriptor>
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    engine.pending_descriptors.lock().unwrap().get(&id).copied()
}

fn forget_pending<F, Buf>(engine: &Engine<F, Buf>, id: RequestId)
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    engine.pending_descriptors.lock().unwrap().remove(&id);
}

/// One pass of the dispatch loop (§4.4, §4.10): drain overflowed
/// completions back into the CQ, drain fired poll arms, drain worker
/// completions, drain fired timeouts, then flush whatever the defer
/// queue is now free to run. Returns whether any of that actually did
/// something, so an idle `sqthread` knows it's safe to sleep.
pub(crate) fn drive_once<F, Buf>(engine: &Engine<F, Buf>) -> bool
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    let _guard = engine.completion_lock.lock().unwrap();
    let mut did_work = false;

    engine.cq.drain_overflow_into_ring();

    let mut poll_buf =
        vec![PollFired { request_id: RequestId(0), readable: false, writable: false }; engine.config.max_poll_drain.max(1)];
    let n = engine.poller.drain_fired(&mut poll_buf);
    if n > 0 {
        did_work = true;
        if let Some(arc) = engine.self_weak.upgrade() {
            for fired in poll_buf.into_iter().take(n) {
                on_poll_fired(&arc, fired);
            }
        }
    }

    let mut worker_buf = vec![WorkerCompletion { request_id: RequestId(0), result: 0 }; engine.config.max_worker_drain.max(1)];
    let wn = engine.workers.poll_completions(&mut worker_buf);
    if wn > 0 {
        did_work = true;
        for comp in worker_buf.into_iter().take(wn) {
            complete_request(engine, comp.request_id, comp.result);
        }
    }

    let fired_timeouts = engine.timeouts.poll_fired(Instant::now());
    if !fired_timeouts.is_empty() {
        did_work = true;
        for (tid, linked_to) in fired_timeouts {
            if let Some(subject) = linked_to {
                engine.pool.with_request(subject, |r| r.timeout_link = None);
                try_cancel_request(engine, subject);
            }
            complete_request(engine, tid, -libc::ETIME);
        }
    }

    if !engine.draining.load(Ordering::Acquire) {
        if let Some(arc) = engine.self_weak.upgrade() {
            if flush_defer_queue(&arc) {
                did_work = true;
            }
        }
    }

    did_work
}

/// Run every entry the defer queue is currently holding, stopping early
/// if a freshly-dispatched DRAIN member re-arms the barrier (later
/// entries then wait for that barrier in turn, on a future pass).
fn flush_defer_queue<F, Buf>(engine: &Arc<Engine<F, Buf>>) -> bool
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    let mut any = false;
    loop {
        let next = engine.defer_queue.lock().unwrap().pop_front();
        match next {
            Some(id) => {
                any = true;
                let owning_task = match engine.pool.with_request(id, |r| r.owning_task) {
                    Some(t) => t,
                    None => continue,
                };
                dispatch_new_entry(engine, id, owning_task);
                if engine.draining.load(Ordering::Acquire) {
                    break;
                }
            }
            None => break,
        }
    }
    any
}

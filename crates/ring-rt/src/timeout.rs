//! `TimeoutService` — count-based and wall-clock timeouts (§4.8).
//!
//! Two flavors:
//!
//! - **Count-based**: fires once the completion stream reaches a target
//!   sequence number. Comparison is wrap-safe via
//!   `EngineMetrics::reached` (§9's resolution of the wraparound open
//!   question): `(completions_issued.wrapping_sub(target) as i64) >= 0`.
//! - **Absolute/relative wall-clock**: fires at a deadline derived from
//!   `Instant::now()` at submission time.
//!
//! Like `LinkGraph`, this has no direct teacher analog — timeouts don't
//! exist in the teacher's syscall-forwarding domain — so it's built fresh
//! in the house style: a small sorted accumulation behind one `Mutex`,
//! polled once per dispatch pass rather than driven by a dedicated timer
//! thread, matching the engine's single-dispatcher-thread model (§4.10).

use std::sync::Arc;
use std::time::Instant;

use ring_core::request::RequestId;
use ring_core::shared::EngineMetrics;

#[derive(Clone, Copy)]
enum Deadline {
    CompletionCount(u64),
    WallClock(Instant),
}

struct Entry {
    request_id: RequestId,
    deadline: Deadline,
    /// The request this timeout is linked to, if it's an IO_LINK_TIMEOUT
    /// rather than a freestanding TIMEOUT (§4.8).
    linked_to: Option<RequestId>,
}

/// Tracks outstanding timeouts and reports which have fired.
pub struct TimeoutService {
    entries: std::sync::Mutex<Vec<Entry>>,
    metrics: Arc<EngineMetrics>,
}

impl TimeoutService {
    pub fn new(metrics: Arc<EngineMetrics>) -> Self {
        Self { entries: std::sync::Mutex::new(Vec::new()), metrics }
    }

    pub fn register_count(&self, request_id: RequestId, target: u64, linked_to: Option<RequestId>) {
        self.entries.lock().unwrap().push(Entry {
            request_id,
            deadline: Deadline::CompletionCount(target),
            linked_to,
        });
    }

    pub fn register_wall_clock(&self, request_id: RequestId, at: Instant, linked_to: Option<RequestId>) {
        self.entries.lock().unwrap().push(Entry {
            request_id,
            deadline: Deadline::WallClock(at),
            linked_to,
        });
    }

    /// Remove a timeout before it fires, e.g. because its subject request
    /// completed first and raced the clock (§4.8, §9 "link timeout races
    /// its subject").
    pub fn cancel(&self, request_id: RequestId) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.request_id != request_id);
        entries.len() != before
    }

    /// Poll for fired timeouts (count-based against the current completion
    /// sequence, wall-clock against `now`). Returns `(request_id,
    /// linked_to)` pairs; the caller is responsible for completing the
    /// timeout request with `-ETIME` and, if `linked_to` is set, either
    /// cancelling or leaving its subject alone per whichever raced first.
    pub fn poll_fired(&self, now: Instant) -> Vec<(RequestId, Option<RequestId>)> {
        let mut entries = self.entries.lock().unwrap();
        let mut fired = Vec::new();
        entries.retain(|e| {
            let is_fired = match e.deadline {
                Deadline::CompletionCount(target) => self.metrics.reached(target),
                Deadline::WallClock(at) => now >= at,
            };
            if is_fired {
                fired.push((e.request_id, e.linked_to));
            }
            !is_fired
        });
        fired
    }

    pub fn pending_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_based_timeout_fires_after_target_reached() {
        let metrics = Arc::new(EngineMetrics::default());
        let svc = TimeoutService::new(Arc::clone(&metrics));
        svc.register_count(RequestId(1), 3, None);

        assert!(svc.poll_fired(Instant::now()).is_empty());
        for _ in 0..3 {
            metrics.bump_completions_issued();
        }
        let fired = svc.poll_fired(Instant::now());
        assert_eq!(fired, vec![(RequestId(1), None)]);
        assert_eq!(svc.pending_count(), 0);
    }

    #[test]
    fn cancel_removes_before_fire() {
        let metrics = Arc::new(EngineMetrics::default());
        let svc = TimeoutService::new(metrics);
        svc.register_wall_clock(RequestId(7), Instant::now() + std::time::Duration::from_secs(60), None);
        assert!(svc.cancel(RequestId(7)));
        assert_eq!(svc.pending_count(), 0);
    }
}

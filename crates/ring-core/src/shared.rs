//! Read-only metadata shared with the application (§9 "Global state",
//! the `EngineMetrics` open-question resolution).
//!
//! The source exposes a shared page of ring offsets/flags that the
//! application mmaps read-only. This engine's rings are in-process
//! (§4.1 notes the mmap path is `ring-rt`'s concern, not `ring-core`'s),
//! but the same "cheap, lock-free, read-only counters" need shows up for
//! diagnostics — `sq_dropped`, `cq_overflow`, ring occupancy — so it gets
//! the same treatment: one small struct of atomics the application can
//! read without taking any lock the dispatcher holds.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Default)]
pub struct EngineMetrics {
    /// Submissions rejected at the SQ boundary because it was full (§4.1).
    sq_dropped: AtomicU32,
    /// Completions that overflowed the CQ and went to the spill list (§4.1,
    /// §9 "Backpressure/Cancellation races").
    cq_overflow: AtomicU32,
    /// Total completions ever produced, used for wrap-safe timeout sequence
    /// comparisons (§4.8, §9's resolution of that open question).
    completions_issued: AtomicU64,
}

impl EngineMetrics {
    pub fn record_sq_dropped(&self) {
        self.sq_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cq_overflow(&self) {
        self.cq_overflow.fetch_add(1, Ordering::Relaxed);
    }

    /// Called exactly once per completion entry produced, in the same
    /// moment the entry is pushed (or spilled). Returns the sequence number
    /// just assigned, which timeout targets compare against.
    pub fn bump_completions_issued(&self) -> u64 {
        self.completions_issued.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn completions_issued(&self) -> u64 {
        self.completions_issued.load(Ordering::Acquire)
    }

    pub fn sq_dropped(&self) -> u32 {
        self.sq_dropped.load(Ordering::Relaxed)
    }

    pub fn cq_overflow(&self) -> u32 {
        self.cq_overflow.load(Ordering::Relaxed)
    }

    /// Wrap-safe "has the completion stream reached `target` yet" check
    /// used by count-based timeouts (§4.8, §9).
    pub fn reached(&self, target: u64) -> bool {
        let issued = self.completions_issued();
        (issued.wrapping_sub(target) as i64) >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reached_handles_wraparound() {
        let m = EngineMetrics::default();
        for _ in 0..5 {
            m.bump_completions_issued();
        }
        assert!(m.reached(5));
        assert!(!m.reached(6));
    }
}

//! `CompletionPath` — default `CompletionSink` implementation (§4.1).
//!
//! Wraps a `CqRing` (the ring + overflow spill list) and a `Notifier`.
//! Pushes never fail — they spill instead — so the only way this produces
//! an `Err` is a defensive one the trait contract reserves for an
//! exhausted implementation, which this one never hits (the overflow list
//! is unbounded, matching io_uring's own CQ-overflow behavior of favoring
//! "never lose a completion" over a hard memory cap).

use std::sync::Arc;

use ring_core::completion::{CompletionEntry, CompletionSink};
use ring_core::descriptor::UserData;
use ring_core::error::Result;
use ring_core::notifier::Notifier;

use crate::rings::CqRing;

pub struct CompletionPath<N: Notifier> {
    cq: Arc<CqRing>,
    notifier: N,
}

impl<N: Notifier> CompletionPath<N> {
    pub fn new(cq: Arc<CqRing>, notifier: N) -> Self {
        Self { cq, notifier }
    }

    /// Called once per dispatch pass, before producing this pass's fresh
    /// completions, so older spilled entries win any race for ring space.
    pub fn drain_overflow(&self) {
        self.cq.drain_overflow_into_ring();
    }
}

impl<N: Notifier> CompletionSink for CompletionPath<N> {
    fn push(&self, user_data: UserData, result: i32, flags: u32) -> Result<()> {
        self.cq.push(CompletionEntry::new(user_data, result, flags));
        Ok(())
    }

    fn flush_and_notify(&self) -> Result<()> {
        self.notifier.notify();
        Ok(())
    }

    fn overflow_count(&self) -> u32 {
        self.cq.overflow_count()
    }

    fn overflow_flag(&self) -> bool {
        self.cq.overflow_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring_core::shared::EngineMetrics;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNotifier(AtomicUsize);

    impl Notifier for CountingNotifier {
        fn notify(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn overflow_spills_then_drains() {
        let metrics = Arc::new(EngineMetrics::default());
        let cq = Arc::new(CqRing::new(2, metrics));
        let path = CompletionPath::new(Arc::clone(&cq), CountingNotifier(AtomicUsize::new(0)));

        for i in 0..4u64 {
            path.push(UserData(i), i as i32, 0).unwrap();
        }
        assert_eq!(path.overflow_count(), 2);

        let mut buf = [CompletionEntry::new(UserData::NONE, 0, 0); 2];
        let n = cq.dequeue_batch(&mut buf);
        assert_eq!(n, 2);

        path.drain_overflow();
        assert_eq!(path.overflow_count(), 0);
    }
}

//! `SqRing`/`CqRing` — the policy layer over `ring_core::ring::Ring` (§4.1).
//!
//! `Ring<T>` supplies the lock-free mechanism; this module adds the two
//! policies each side actually needs: the SQ's drop counter when the
//! application outruns the dispatcher, and the CQ's overflow spill list
//! when completions outrun the application's reap rate.

use std::sync::Mutex;

use ring_core::completion::CompletionEntry;
use ring_core::descriptor::SubmissionDescriptor;
use ring_core::error::Result;
use ring_core::ring::Ring;
use ring_core::shared::EngineMetrics;

/// The submission side: a `Ring<SubmissionDescriptor>` plus the running
/// `sq_dropped` counter (§4.1, §6).
pub struct SqRing {
    ring: Ring<SubmissionDescriptor>,
    metrics: std::sync::Arc<EngineMetrics>,
}

impl SqRing {
    pub fn new(capacity: u32, metrics: std::sync::Arc<EngineMetrics>) -> Self {
        Self {
            ring: Ring::new(capacity, SubmissionDescriptor::zeroed()),
            metrics,
        }
    }

    /// Submit one descriptor. On failure the drop is already accounted for
    /// in `metrics.sq_dropped` before returning, matching §4.1's "the
    /// application can observe the drop count without taking any lock the
    /// dispatcher holds."
    pub fn submit(&self, descriptor: SubmissionDescriptor) -> Result<()> {
        match self.ring.try_push(descriptor) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.metrics.record_sq_dropped();
                Err(e)
            }
        }
    }

    pub fn dequeue_batch(&self, buf: &mut [SubmissionDescriptor]) -> usize {
        self.ring.dequeue_batch(buf)
    }

    pub fn capacity(&self) -> u32 {
        self.ring.capacity()
    }

    pub fn len(&self) -> u32 {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

/// The completion side: a `Ring<CompletionEntry>` plus an overflow spill
/// list (§4.1, §9 "Backpressure/Cancellation races").
///
/// When the ring is full, entries land in `overflow` instead of being
/// dropped — io_uring's CQ never silently loses a completion, and neither
/// does this one. `drain_overflow_into_ring` is called once per dispatch
/// pass to push spilled entries back in as ring space frees up, in FIFO
/// order relative to each other (but after whatever is already queued,
/// since they arrived later only in the sense that the ring was full when
/// they were produced).
pub struct CqRing {
    ring: Ring<CompletionEntry>,
    overflow: Mutex<Vec<CompletionEntry>>,
    metrics: std::sync::Arc<EngineMetrics>,
}

impl CqRing {
    pub fn new(capacity: u32, metrics: std::sync::Arc<EngineMetrics>) -> Self {
        Self {
            ring: Ring::new(capacity, CompletionEntry::new(ring_core::descriptor::UserData::NONE, 0, 0)),
            overflow: Mutex::new(Vec::new()),
            metrics,
        }
    }

    /// Push a completion entry, spilling to `overflow` if the ring is
    /// momentarily full rather than dropping it.
    pub fn push(&self, entry: CompletionEntry) {
        self.metrics.bump_completions_issued();
        if self.ring.try_push(entry).is_err() {
            self.metrics.record_cq_overflow();
            self.overflow.lock().unwrap().push(entry);
        }
    }

    /// Move as many spilled entries as will fit back into the ring. Called
    /// once per dispatch pass, before new completions for this pass are
    /// produced, so overflow entries — which are strictly older — are
    /// always reinserted ahead of fresh ones.
    pub fn drain_overflow_into_ring(&self) {
        let mut overflow = self.overflow.lock().unwrap();
        while let Some(entry) = overflow.first().copied() {
            if self.ring.try_push(entry).is_err() {
                break;
            }
            overflow.remove(0);
        }
    }

    pub fn overflow_count(&self) -> u32 {
        self.overflow.lock().unwrap().len() as u32
    }

    pub fn dequeue_batch(&self, buf: &mut [CompletionEntry]) -> usize {
        self.ring.dequeue_batch(buf)
    }

    pub fn capacity(&self) -> u32 {
        self.ring.capacity()
    }
}

//! `Ring<T>` — the generic lock-free SPSC/MPSC ring underlying both SQ and
//! CQ (§4.1, §3 "Ring").
//!
//! A ring is a fixed-size power-of-two array with independent head and
//! tail indices. `mask = capacity - 1`; `slot(i) = ring[i & mask]`. Empty
//! when `head == tail`, full when `tail - head == capacity`. Indices are
//! never masked when compared — unsigned wraparound is intentional, and
//! comparisons use wrapping subtraction so `tail - head <= capacity` holds
//! across a single wrap (§4.1 "Tie-breaks").
//!
//! Producers CAS-advance the tail, claim their slot, then write it —
//! matching the multi-producer discipline the submission side needs (many
//! application threads may submit concurrently) while staying correct
//! for the single-producer completion side (the CAS simply never
//! contends). The consumer side is always single-reader: SQ is drained
//! only by the engine's dispatch path, CQ only by the application's reap
//! path, so head advances with a plain store under the consumer's
//! exclusive ownership.
//!
//! This struct carries the ring-protocol *mechanism* only. SQ-specific
//! policy (index indirection, the `sq_dropped` counter) and CQ-specific
//! policy (the overflow spill list) are layered on top in `ring-rt`.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{EngineError, Result};

pub struct Ring<T> {
    slots: Box<[UnsafeCell<T>]>,
    mask: u32,
    capacity: u32,
    /// Consumer position. Advanced only by the single consumer.
    head: AtomicU32,
    /// Producer position. CAS-advanced by (possibly many) producers.
    tail: AtomicU32,
}

// Safety: slot contents are only read after an acquire-ordered observation
// of the producer's tail advance, and only written by the thread that won
// the CAS claiming that slot — equivalent to the teacher's `SubmitRing`
// safety argument in `submit_ring.rs`.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T: Clone> Ring<T> {
    /// Build a ring backed by ordinary heap memory, pre-filled with
    /// `fill.clone()` in every slot. `ring-rt` additionally offers an
    /// mmap-backed constructor for real shared-memory deployment; this one
    /// is what in-process engines and unit tests use.
    pub fn new(capacity: u32, fill: T) -> Self {
        assert!(capacity.is_power_of_two(), "ring capacity must be a power of two");
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(fill.clone()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            mask: capacity - 1,
            capacity,
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
        }
    }
}

impl<T> Ring<T> {
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn len(&self) -> u32 {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Raw head index (consumer position). Exposed read-only so `ring-rt`
    /// can publish it to shared memory without re-deriving the value.
    pub fn raw_head(&self) -> u32 {
        self.head.load(Ordering::Acquire)
    }

    pub fn raw_tail(&self) -> u32 {
        self.tail.load(Ordering::Acquire)
    }

    /// CAS-claim the next slot and write `value` into it. Safe to call
    /// from any number of producer threads concurrently.
    pub fn try_push(&self, value: T) -> Result<()> {
        loop {
            let tail = self.tail.load(Ordering::Relaxed);
            let head = self.head.load(Ordering::Acquire);
            if tail.wrapping_sub(head) >= self.capacity {
                return Err(EngineError::RingFull);
            }
            match self.tail.compare_exchange_weak(
                tail,
                tail.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    let idx = (tail & self.mask) as usize;
                    // Safety: we alone own this slot — the CAS above is
                    // the only way to claim it, and nobody claims the same
                    // tail value twice.
                    unsafe {
                        *self.slots[idx].get() = value;
                    }
                    return Ok(());
                }
                Err(_) => {
                    std::hint::spin_loop();
                    continue;
                }
            }
        }
    }

    /// Single-consumer dequeue of up to `buf.len()` entries. Never call
    /// this from more than one thread at a time for the same `Ring`.
    pub fn dequeue_batch(&self, buf: &mut [T]) -> usize
    where
        T: Copy,
    {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let available = tail.wrapping_sub(head) as usize;
        let count = available.min(buf.len());
        for (i, slot) in buf.iter_mut().enumerate().take(count) {
            let idx = (head.wrapping_add(i as u32) & self.mask) as usize;
            // Safety: indices in `head..tail` were published by a producer
            // with Release semantics in `try_push`'s CAS; we observed
            // `tail` with Acquire above, so those writes are visible.
            *slot = unsafe { *self.slots[idx].get() };
        }
        if count > 0 {
            self.head.store(head.wrapping_add(count as u32), Ordering::Release);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_single_thread() {
        let ring: Ring<u32> = Ring::new(8, 0);
        for i in 0..5u32 {
            ring.try_push(i).unwrap();
        }
        assert_eq!(ring.len(), 5);
        let mut buf = [0u32; 8];
        let n = ring.dequeue_batch(&mut buf);
        assert_eq!(n, 5);
        assert_eq!(&buf[..5], &[0, 1, 2, 3, 4]);
        assert!(ring.is_empty());
    }

    #[test]
    fn full_ring_rejects_push() {
        let ring: Ring<u32> = Ring::new(4, 0);
        for i in 0..4u32 {
            ring.try_push(i).unwrap();
        }
        assert!(matches!(ring.try_push(99), Err(EngineError::RingFull)));
    }

    #[test]
    fn wraps_across_many_rounds() {
        let ring: Ring<u32> = Ring::new(4, 0);
        for round in 0..10u32 {
            for i in 0..4u32 {
                ring.try_push(round * 10 + i).unwrap();
            }
            let mut buf = [0u32; 4];
            let n = ring.dequeue_batch(&mut buf);
            assert_eq!(n, 4);
            assert_eq!(buf[0], round * 10);
        }
    }

    #[test]
    fn concurrent_producers_no_duplicates() {
        use std::sync::Arc;
        let ring = Arc::new(Ring::<u64>::new(1024, 0));
        let mut handles = vec![];
        for t in 0..4u64 {
            let ring = Arc::clone(&ring);
            handles.push(std::thread::spawn(move || {
                for i in 0..100u64 {
                    while ring.try_push(t * 1000 + i).is_err() {
                        std::hint::spin_loop();
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ring.len(), 400);
        let mut buf = [0u64; 400];
        let n = ring.dequeue_batch(&mut buf);
        assert_eq!(n, 400);
        let seen: std::collections::HashSet<_> = buf.iter().copied().collect();
        assert_eq!(seen.len(), 400);
    }
}

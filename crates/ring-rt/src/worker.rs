//! `FixedPool` — default `WorkerPool` implementation (§4.6).
//!
//! Two thread groups:
//!
//! - **Bounded group**: `min(sq_capacity, 4 * available_parallelism)`
//!   threads, sized at construction. Ops flagged `hash_by_file` are routed
//!   to one of these threads by `hash_key % thread_count`, so two ops
//!   against the same file always land on the same thread and therefore
//!   never run concurrently with each other — without needing a lock per
//!   file.
//! - **Unbounded group**: spawns a fresh thread per task, for ops flagged
//!   `unbound_nonreg_file` that may block indefinitely (e.g. reading from
//!   a pipe with no writer) and must not be able to starve the bounded
//!   group's fixed thread count.
//!
//! Mirrors the teacher's `FixedPool`: no dynamic scaling of the bounded
//! group, predictable thread count, correctness over throughput.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_queue::ArrayQueue;

use ring_core::error::{EngineError, Result};
use ring_core::worker::{HashKey, WorkerCompletion, WorkerPool, WorkerTask};

struct Shard {
    work_queue: ArrayQueue<Box<dyn WorkerTask>>,
    active: AtomicUsize,
}

struct PoolInner {
    shards: Vec<Shard>,
    result_queue: ArrayQueue<WorkerCompletion>,
    shutdown: AtomicBool,
    unbounded_active: AtomicUsize,
}

pub struct FixedPool {
    inner: Arc<PoolInner>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl FixedPool {
    /// `n` bounded-group threads, each with its own `queue_depth`-deep
    /// work queue, plus a shared result queue of the same depth times `n`.
    pub fn new(n: usize, queue_depth: usize) -> Self {
        let n = n.max(1).min(128);
        let shards: Vec<Shard> = (0..n)
            .map(|_| Shard {
                work_queue: ArrayQueue::new(queue_depth),
                active: AtomicUsize::new(0),
            })
            .collect();
        let inner = Arc::new(PoolInner {
            shards,
            result_queue: ArrayQueue::new(queue_depth * n.max(1)),
            shutdown: AtomicBool::new(false),
            unbounded_active: AtomicUsize::new(0),
        });

        let mut handles = Vec::with_capacity(n);
        for shard_id in 0..n {
            let inner = Arc::clone(&inner);
            let handle = thread::Builder::new()
                .name(format!("ring-worker-{shard_id}"))
                .spawn(move || shard_loop(inner, shard_id))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        FixedPool { inner, handles }
    }

    /// §4.6 sizing: `min(sq_capacity, 4 * available_parallelism)`.
    pub fn sized_for_sq(sq_capacity: u32, queue_depth: usize) -> Self {
        let cpus = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        let n = (4 * cpus).min(sq_capacity as usize).max(1);
        Self::new(n, queue_depth)
    }

    fn shard_for(&self, hash_key: HashKey) -> usize {
        match hash_key {
            Some(key) => (key as usize) % self.inner.shards.len(),
            None => fastrand_shard(self.inner.shards.len()),
        }
    }
}

/// Cheap, non-cryptographic load spreading for unkeyed work: round-robins
/// via a thread-local counter rather than pulling in a RNG dependency.
fn fastrand_shard(n: usize) -> usize {
    thread_local! {
        static COUNTER: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
    }
    COUNTER.with(|c| {
        let v = c.get();
        c.set(v.wrapping_add(1));
        v % n.max(1)
    })
}

impl WorkerPool for FixedPool {
    fn enqueue(&self, hash_key: HashKey, task: Box<dyn WorkerTask>) -> Result<()> {
        if self.inner.shutdown.load(Ordering::Relaxed) {
            return Err(EngineError::WorkerUnavailable);
        }
        let shard = self.shard_for(hash_key);
        self.inner.shards[shard]
            .work_queue
            .push(task)
            .map_err(|_| EngineError::WorkerUnavailable)
    }

    fn enqueue_unbounded(&self, task: Box<dyn WorkerTask>) -> Result<()> {
        if self.inner.shutdown.load(Ordering::Relaxed) {
            return Err(EngineError::WorkerUnavailable);
        }
        let inner = Arc::clone(&self.inner);
        inner.unbounded_active.fetch_add(1, Ordering::Relaxed);
        let spawned = thread::Builder::new()
            .name("ring-worker-unbounded".into())
            .spawn(move || {
                let completion = task.run();
                let mut retries = 0;
                while inner.result_queue.push(completion).is_err() {
                    retries += 1;
                    if retries > 1000 || inner.shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    std::hint::spin_loop();
                }
                inner.unbounded_active.fetch_sub(1, Ordering::Relaxed);
            });
        match spawned {
            Ok(handle) => {
                // Detached: the unbounded group intentionally doesn't join
                // per-task handles, only tracks the live count.
                drop(handle);
                Ok(())
            }
            Err(_) => {
                self.inner.unbounded_active.fetch_sub(1, Ordering::Relaxed);
                Err(EngineError::WorkerUnavailable)
            }
        }
    }

    fn poll_completions(&self, buf: &mut [WorkerCompletion]) -> usize {
        let mut count = 0;
        while count < buf.len() {
            match self.inner.result_queue.pop() {
                Some(comp) => {
                    buf[count] = comp;
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    fn active_workers(&self) -> usize {
        self.inner
            .shards
            .iter()
            .map(|s| s.active.load(Ordering::Relaxed))
            .sum::<usize>()
            + self.inner.unbounded_active.load(Ordering::Relaxed)
    }

    fn total_workers(&self) -> usize {
        self.inner.shards.len()
    }

    fn max_workers(&self) -> usize {
        self.inner.shards.len()
    }

    fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Drop for FixedPool {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

fn shard_loop(inner: Arc<PoolInner>, shard_id: usize) {
    let shard = &inner.shards[shard_id];
    loop {
        if inner.shutdown.load(Ordering::Relaxed) {
            break;
        }
        match shard.work_queue.pop() {
            Some(task) => {
                shard.active.fetch_add(1, Ordering::Relaxed);
                let completion = task.run();
                shard.active.fetch_sub(1, Ordering::Relaxed);

                let mut retries = 0;
                while inner.result_queue.push(completion).is_err() {
                    retries += 1;
                    if retries > 1000 || inner.shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    std::hint::spin_loop();
                }
            }
            None => {
                thread::park_timeout(std::time::Duration::from_millis(1));
            }
        }
    }
}

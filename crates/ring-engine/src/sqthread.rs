//! Optional dedicated submission-poller thread (§4.11).
//!
//! An embedder that doesn't want to call `enter()` itself — because its
//! own threads only ever call `submit()` and read completions off the CQ
//! — can spawn an `SqThread` instead. It repeatedly drains the SQ and
//! drives one dispatch pass, the same way `FixedPool`'s `shard_loop`
//! repeatedly drains a work queue: pop, work, and `thread::park_timeout`
//! when there was nothing to do, rather than a tight spin or a condvar.
//!
//! Mirrors the teacher's worker-thread idiom exactly (see
//! `ring_rt::worker::shard_loop`) — a submission thread is, in effect, a
//! worker whose queue is the SQ ring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ring_core::request::TaskId;

use crate::engine::Engine;

/// Drives one `Engine`'s SQ and dispatch loop from a dedicated thread.
pub struct SqThread {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SqThread {
    /// Spawn the thread. `owning_task` is the `TaskId` every entry this
    /// thread accepts from the SQ is attributed to — callers that need
    /// per-submitter-task attribution (e.g. owning-task cancellation)
    /// should stamp that onto the descriptor's `user_data` themselves,
    /// since the SQ has no other channel for "who submitted this."
    pub fn spawn<F, Buf>(engine: Arc<Engine<F, Buf>>, owning_task: TaskId) -> Self
    where
        F: Clone + Send + Sync + 'static,
        Buf: Clone + Send + Sync + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);
        let idle_sleep = Duration::from_micros(engine.config.idle_sleep_us);

        let handle = thread::Builder::new()
            .name("ring-sqthread".into())
            .spawn(move || sqthread_loop(engine, owning_task, thread_shutdown, idle_sleep))
            .expect("failed to spawn sqthread");

        SqThread { shutdown, handle: Some(handle) }
    }

    /// Signal the thread to stop and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for SqThread {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

fn sqthread_loop<F, Buf>(
    engine: Arc<Engine<F, Buf>>,
    owning_task: TaskId,
    shutdown: Arc<AtomicBool>,
    idle_sleep: Duration,
) where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    loop {
        if shutdown.load(Ordering::Relaxed) || engine.is_shutdown() {
            break;
        }

        let submitted = engine
            .enter(engine.config.max_batch, 0, crate::engine::EnterFlags::default(), owning_task)
            .unwrap_or(0);
        let did_work = engine.drive_once();

        if submitted == 0 && !did_work {
            thread::park_timeout(idle_sleep);
        }
    }
}

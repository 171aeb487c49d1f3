//! The `Engine` type — construction and the external ENTER/REGISTER
//! surface (§5, §6).
//!
//! Holds every collaborator the dispatch state machine needs and the two
//! locks §5 calls out: `uring_lock` serializes the submission path
//! (accepting SQ entries and running §4.4 dispatch), `completion_lock`
//! serializes completion-path commits, the poll hash table, and the
//! defer/timeout lists. Resource tables (§4.3) deliberately take no
//! exclusive lock on their read path — that guarantee lives in
//! `ring_rt::resource_table::ResourceTable`, not here.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ring_core::descriptor::SubmissionDescriptor;
use ring_core::error::{EngineError, Result};
use ring_core::notifier::Notifier;
use ring_core::op::OpTable;
use ring_core::poller::ReadinessPoller;
use ring_core::request::TaskId;
use ring_core::resource::ResourceTable;
use ring_core::shared::EngineMetrics;
use ring_core::worker::WorkerPool;

use ring_rt::cancel::CancellationRegistry;
use ring_rt::link::LinkGraph;
use ring_rt::request_pool::RequestPool;
use ring_rt::rings::{CqRing, SqRing};
use ring_rt::timeout::TimeoutService;

/// Tunables for one engine instance. Mirrors the source's `io_uring_params`
/// plus the dispatch-loop pacing knobs an embedder driving its own
/// [`crate::sqthread`] needs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sq_entries: u32,
    pub cq_entries: u32,
    /// Max SQ entries accepted per `enter()`/drive pass.
    pub max_batch: usize,
    /// Max readiness-poller wakes drained per drive pass.
    pub max_poll_drain: usize,
    /// Max worker-pool completions drained per drive pass.
    pub max_worker_drain: usize,
    /// Sleep duration (microseconds) a `sqthread` takes when a pass does
    /// no work at all.
    pub idle_sleep_us: u64,
    /// Upper bound on spin-poll iterations `enter()` performs while
    /// waiting for `min_complete`, so a caller can never block forever on
    /// a target that will never be reached (e.g. a bad `min_complete`).
    pub enter_spin_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sq_entries: 256,
            cq_entries: 512,
            max_batch: 64,
            max_poll_drain: 128,
            max_worker_drain: 64,
            idle_sleep_us: 100,
            enter_spin_limit: 10_000,
        }
    }
}

/// `ENTER` flags (§6). Plain bitset, matching the style of `ring-core`'s
/// own `SubmitFlags`/`OpCaps` — not worth a `bitflags` dependency for two
/// bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnterFlags(pub u32);

impl EnterFlags {
    pub const GETEVENTS: u32 = 1 << 0;
    pub const SQ_WAKEUP: u32 = 1 << 1;

    #[inline]
    pub fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

/// One engine instance: the rings, the request lifecycle machinery, and
/// every collaborator named in §2's component table.
pub struct Engine<F, Buf>
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    pub(crate) sq: Arc<SqRing>,
    pub(crate) cq: Arc<CqRing>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) pool: RequestPool,
    pub(crate) ops: Arc<dyn OpTable>,
    pub(crate) workers: Arc<dyn WorkerPool>,
    pub(crate) poller: Arc<dyn ReadinessPoller>,
    pub(crate) files: Arc<dyn ResourceTable<F>>,
    pub(crate) buffers: Arc<dyn ResourceTable<Buf>>,
    pub(crate) links: LinkGraph,
    pub(crate) timeouts: TimeoutService,
    pub(crate) cancels: CancellationRegistry,
    pub(crate) metrics: Arc<EngineMetrics>,
    /// Serializes the submission path: accepting SQ entries and running
    /// §4.4 dispatch (§5 "the engine 'uring' lock").
    pub(crate) uring_lock: Mutex<()>,
    /// Serializes completion-path commits, the poll hash table, and the
    /// defer/timeout lists (§5).
    pub(crate) completion_lock: Mutex<()>,
    /// Count of requests accepted but not yet completed; used by the
    /// drain barrier to know when the "before" set has fully drained
    /// (§4.7, §9 open question — resolution documented alongside
    /// `defer_queue` below).
    pub(crate) inflight: AtomicU64,
    /// Set while a drain barrier's "before" set hasn't fully drained yet.
    /// Cleared when `drain_owner` itself completes (§4.7, §9 open question
    /// #1 — resolution in `ring_rt::link`).
    pub(crate) draining: AtomicBool,
    /// The request id whose completion releases the current drain barrier.
    /// `u32::MAX` means "no owner" (mirrors `RequestId`'s slab-index space,
    /// which never legitimately reaches `u32::MAX` except the pool's
    /// singleton fallback slot, which can never itself carry `DRAIN`).
    pub(crate) drain_owner: AtomicU32,
    /// Requests waiting behind a drain barrier, in acceptance order.
    /// Descriptors live in `pending_descriptors`, not inline here, so a
    /// request that's also a chain successor (never queued here at all —
    /// it waits on its predecessor instead) shares the same lookaside.
    pub(crate) defer_queue: Mutex<std::collections::VecDeque<ring_core::request::RequestId>>,
    /// Descriptor for every request accepted but not yet dispatched through
    /// `OpHandler::prepare` — chain successors waiting on a predecessor,
    /// drain successors waiting on a barrier, and linked-timeout subjects.
    /// Entries are removed once dispatched or once the request completes.
    pub(crate) pending_descriptors: Mutex<std::collections::HashMap<ring_core::request::RequestId, SubmissionDescriptor>>,
    pub(crate) config: EngineConfig,
    next_task: AtomicU64,
    shutdown: AtomicBool,
    /// `REGISTER(PERSONALITY, ...)` table: credential index to an opaque
    /// credential value (e.g. a uid/gid pair packed by the embedder).
    /// Modeled as a plain locked map rather than a `ResourceTable` node-
    /// replacement structure — personalities are looked up once per
    /// submission that names one, not on every I/O's hot path, so the
    /// node-replacement machinery's read-without-locking guarantee buys
    /// nothing here (§1 "registration of ... credentials ... abstractly
    /// modeled as registered resource tables").
    personalities: Mutex<std::collections::HashMap<u16, u32>>,
    next_personality: AtomicU32,
    /// Lets dispatch code hand worker tasks an owning `Arc<Engine>` without
    /// the engine needing a forward reference to its own `Arc` at
    /// construction time (§9 "cyclic reference risk").
    pub(crate) self_weak: std::sync::Weak<Self>,
}

/// Everything §1 calls an "external collaborator," gathered so `setup`
/// doesn't take eleven positional arguments.
pub struct EngineDeps<F, Buf>
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    pub ops: Arc<dyn OpTable>,
    pub workers: Arc<dyn WorkerPool>,
    pub poller: Arc<dyn ReadinessPoller>,
    pub notifier: Arc<dyn Notifier>,
    pub files: Arc<dyn ResourceTable<F>>,
    pub buffers: Arc<dyn ResourceTable<Buf>>,
}

impl<F, Buf> Engine<F, Buf>
where
    F: Clone + Send + Sync + 'static,
    Buf: Clone + Send + Sync + 'static,
{
    /// `SETUP(entries, params)` (§6): allocate an engine instance.
    pub fn setup(config: EngineConfig, deps: EngineDeps<F, Buf>) -> Result<Arc<Self>> {
        let metrics = Arc::new(EngineMetrics::default());
        let sq = Arc::new(SqRing::new(config.sq_entries, Arc::clone(&metrics)));
        let cq = Arc::new(CqRing::new(config.cq_entries, Arc::clone(&metrics)));
        let pool = RequestPool::new(config.sq_entries);

        eprintln!(
            "ring-engine: setup — sq:{} cq:{} max_batch:{}",
            config.sq_entries, config.cq_entries, config.max_batch
        );

        Ok(Arc::new_cyclic(|weak| Self {
            sq,
            cq,
            notifier: deps.notifier,
            pool,
            ops: deps.ops,
            workers: deps.workers,
            poller: deps.poller,
            files: deps.files,
            buffers: deps.buffers,
            links: LinkGraph::new(),
            timeouts: TimeoutService::new(Arc::clone(&metrics)),
            cancels: CancellationRegistry::new(),
            metrics,
            uring_lock: Mutex::new(()),
            completion_lock: Mutex::new(()),
            inflight: AtomicU64::new(0),
            draining: AtomicBool::new(false),
            drain_owner: AtomicU32::new(u32::MAX),
            defer_queue: Mutex::new(std::collections::VecDeque::new()),
            pending_descriptors: Mutex::new(std::collections::HashMap::new()),
            config,
            next_task: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
            personalities: Mutex::new(std::collections::HashMap::new()),
            next_personality: AtomicU32::new(1),
            self_weak: weak.clone(),
        }))
    }

    /// Mint a fresh `TaskId` for a new submitting context (a syscall
    /// caller, in the source; here, whatever the embedder calls `enter`
    /// from).
    pub fn new_task(&self) -> TaskId {
        TaskId(self.next_task.fetch_add(1, Ordering::Relaxed))
    }

    /// Submit one descriptor into the SQ, from the application side.
    /// Independent of `enter` so an embedder can batch many `submit`
    /// calls before a single `enter`.
    pub fn submit(&self, descriptor: SubmissionDescriptor) -> Result<()> {
        self.sq.submit(descriptor)
    }

    /// `ENTER(handle, to_submit, min_complete, flags, sigmask)` (§6).
    ///
    /// Drains and dispatches up to `to_submit` SQ entries (if nonzero),
    /// then — if `GETEVENTS` is set — spin-polls the drive loop until at
    /// least `min_complete` completions have been committed since this
    /// call started, or `enter_spin_limit` passes elapse.
    pub fn enter(
        self: &Arc<Self>,
        to_submit: usize,
        min_complete: u32,
        flags: EnterFlags,
        owning_task: TaskId,
    ) -> Result<u32> {
        let submitted = if to_submit > 0 {
            self.drain_and_accept(to_submit, owning_task)?
        } else {
            0
        };

        if flags.has(EnterFlags::GETEVENTS) && min_complete > 0 {
            let start = self.metrics.completions_issued();
            let mut spins = 0u32;
            while self.metrics.completions_issued().wrapping_sub(start) < min_complete as u64 {
                self.drive_once();
                spins += 1;
                if spins >= self.config.enter_spin_limit {
                    break;
                }
                if spins % 64 == 0 {
                    std::thread::yield_now();
                }
            }
        } else {
            // Still give pending work a chance to progress even without a
            // wait request, matching the source's "always drain once"
            // behavior on every ENTER.
            self.drive_once();
        }

        Ok(submitted)
    }

    /// Reap up to `buf.len()` committed completions. Mirrors the
    /// application reading the CQ ring directly from shared memory; here
    /// it's just a direct dequeue since the ring is in-process.
    pub fn reap(&self, buf: &mut [ring_core::completion::CompletionEntry]) -> usize {
        self.cq.dequeue_batch(buf)
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Whether any completions currently sit on the CQ's overflow spill
    /// list — the application-visible `CQ_OVERFLOW` flag (§4.1, §9's
    /// ring-wide fields), distinct from `metrics().cq_overflow()`, which
    /// is a running total that never decreases.
    pub fn cq_overflow_pending(&self) -> bool {
        self.cq.overflow_count() > 0
    }

    /// `REGISTER(handle, FILES, arg, nr_args)` (§6). Must be called while
    /// quiesced (no in-flight dispatch) — callers take `uring_lock` for
    /// the duration, matching the "must execute while the engine is
    /// quiesced" contract for anything except file updates/probe/
    /// personality (§6), which use [`Self::register_files_update`]
    /// instead and need no quiescence.
    pub fn register_files(&self, files: Vec<Option<F>>) -> Result<()> {
        let _guard = self.uring_lock.lock().unwrap();
        self.files.register(files)
    }

    /// `REGISTER(handle, FILES_UPDATE, ...)` — explicitly exempted from
    /// quiescence by §6; the node-replacement pattern (§4.3) is what makes
    /// that safe.
    pub fn register_files_update(&self, updates: Vec<(u32, Option<F>)>) -> Result<()> {
        self.files.update(updates)
    }

    pub fn register_buffers(&self, buffers: Vec<Option<Buf>>) -> Result<()> {
        let _guard = self.uring_lock.lock().unwrap();
        self.buffers.register(buffers)
    }

    pub fn register_buffers_update(&self, updates: Vec<(u32, Option<Buf>)>) -> Result<()> {
        self.buffers.update(updates)
    }

    /// `REGISTER(handle, EVENTFD, fd)` — swap the wake notifier. Exposed
    /// for completeness; most embedders set the notifier once at
    /// `setup()` and never call this.
    pub fn registered_notify_fd(&self) -> Option<i32> {
        self.notifier.notify_fd()
    }

    /// `REGISTER(handle, PROBE, arg, nr_args)` (§6): list every opcode the
    /// wired-up `OpTable` resolves, so an application can check support
    /// without a trial submission. Exempt from quiescence like file
    /// updates and personality — it only reads the (process-wide,
    /// immutable-after-setup, §9 "Global state") capability table.
    pub fn probe(&self) -> Vec<u8> {
        self.ops.supported_opcodes()
    }

    /// `REGISTER(handle, PERSONALITY, creds)` (§6): install a credential
    /// set and return the index a later submission's `descriptor.personality`
    /// field references. Exempt from quiescence, like file updates and
    /// probe — registering a new personality can't invalidate one already
    /// in use by an in-flight request.
    pub fn register_personality(&self, credentials: u32) -> Result<u16> {
        let id = self.next_personality.fetch_add(1, Ordering::Relaxed);
        let id: u16 = id.try_into().map_err(|_| EngineError::SlotOutOfRange(u16::MAX))?;
        self.personalities.lock().unwrap().insert(id, credentials);
        Ok(id)
    }

    /// `REGISTER(handle, UNREGISTER_PERSONALITY, id)` — drop a previously
    /// registered credential set. Unlike fixed files/buffers there is no
    /// node-replacement drain here: nothing holds a long-lived reference
    /// to a personality entry, a submission just looks one up by index at
    /// prepare time, so removal is a plain map removal.
    pub fn unregister_personality(&self, id: u16) -> Result<()> {
        self.personalities
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(EngineError::SlotOutOfRange(id))
    }

    /// Look up a previously registered credential value by index, for an
    /// `OpHandler::prepare` implementation that consumes `descriptor.personality`.
    pub fn personality(&self, id: u16) -> Option<u32> {
        self.personalities.lock().unwrap().get(&id).copied()
    }

    /// One pass of the drive loop, exposed for embedders (like
    /// `sqthread`) that want to run it outside of `enter()`.
    pub fn drive_once(&self) -> bool {
        crate::dispatch::drive_once(self)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Engine teardown (§7 recovery policy): cancel every outstanding
    /// request and drain ECANCELED completions until the pool is empty or
    /// `max_passes` drive passes elapse.
    pub fn shutdown(&self, max_passes: u32) {
        self.shutdown.store(true, Ordering::SeqCst);
        for _ in 0..max_passes {
            if self.inflight.load(Ordering::Relaxed) == 0 {
                break;
            }
            self.drive_once();
        }
        let remaining = self.inflight.load(Ordering::Relaxed);
        self.pool.flush_all_pending();
        self.workers.shutdown();
        eprintln!("ring-engine: shut down — {remaining} request(s) still in flight");
    }

    fn drain_and_accept(self: &Arc<Self>, to_submit: usize, owning_task: TaskId) -> Result<u32> {
        let _guard = self.uring_lock.lock().unwrap();
        let max = to_submit.min(self.config.max_batch);
        let mut buf = vec![SubmissionDescriptor::zeroed(); max];
        let n = self.sq.dequeue_batch(&mut buf);
        if n == 0 {
            return Ok(0);
        }
        crate::dispatch::accept_batch(self, &buf[..n], owning_task)
    }
}

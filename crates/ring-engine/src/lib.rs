//! # ring-engine — the dispatch/retry/defer/poll state machine
//!
//! This crate ties together every collaborator named in the design:
//! `ring_rt`'s rings, request pool, worker pool, readiness poller and
//! resource tables, plus the link graph, timeout service and
//! cancellation registry built fresh for this engine. `Engine` is the
//! single object an embedder constructs via [`Engine::setup`] and then
//! drives via [`Engine::enter`] (the ENTER syscall-surface analog) or a
//! dedicated [`sqthread`].
//!
//! The actual per-request state machine — PREPARED → INLINE → POLL-ARMED
//! / WORKER-QUEUED → COMPLETED → AWAIT-FREE → FREED — lives in
//! [`dispatch`]. `engine` owns construction, the external ENTER/REGISTER
//! surface, and the top-level drive loop; `dispatch` owns what happens to
//! one request at a time.

pub mod dispatch;
pub mod engine;
pub mod sqthread;

pub use engine::{Engine, EngineConfig};

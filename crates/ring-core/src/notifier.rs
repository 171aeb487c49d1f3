//! Completion notification (§4.10, `IORING_SETUP_SQPOLL`/eventfd analogs).
//!
//! The engine must be able to wake an application blocked in `enter()`
//! waiting for completions, and — when the application instead polls the
//! CQ's eventfd from its own event loop — wake that fd. Both are modeled
//! as one trait so the dispatcher doesn't care which wait strategy the
//! embedder picked.

/// Wakes whoever is waiting on new completions.
///
/// # Implementors
///
/// - `ring_rt::notifier::EventfdNotifier` (default): writes to a Linux
///   `eventfd(2)`, letting the application multiplex the engine's
///   completion stream into an existing epoll/io_uring loop.
/// - An in-process condvar notifier for embedders that call `enter()`
///   directly and never touch a raw fd.
pub trait Notifier: Send + Sync {
    /// Signal that at least one new completion entry is available.
    /// Must be safe to call from the dispatch path, including from a
    /// worker thread delivering a completion asynchronously.
    fn notify(&self);

    /// The raw fd an application can fold into its own readiness loop,
    /// if this notifier is backed by one. `None` for in-process-only
    /// notifiers.
    fn notify_fd(&self) -> Option<i32> {
        None
    }
}

//! Cancellation matchers (§4.9).
//!
//! A cancellation request never targets a `Request` object directly — it
//! describes *which* outstanding requests to cancel. The engine walks its
//! live set and asks each candidate whether it matches, so the matching
//! policy stays in one place regardless of which subsystem initiated the
//! cancel (an explicit ASYNC_CANCEL op, task teardown, or file-set
//! teardown).

use crate::request::{Request, RequestId, TaskId};

/// Describes the set of outstanding requests a cancellation should target.
#[derive(Debug, Clone, Copy)]
pub enum CancelMatcher {
    /// Exactly the request that originally carried this `user_data` value.
    ByUserData(crate::descriptor::UserData),
    /// Every live request owned by `task`, e.g. on task exit (§4.9).
    ByOwningTask(TaskId),
    /// Every live request whose `fd`/slot belongs to a file set being torn
    /// down. The concrete file-identity comparison is supplied by the
    /// caller via `file_id`, since file identity is part of the (out of
    /// scope) op surface.
    ByFileSet(u64),
    /// Every live descendant of `root` in the link graph (§4.7), e.g.
    /// cancelling a chain when its head is cancelled.
    ByLinkDescendant(RequestId),
}

impl CancelMatcher {
    /// Whether `candidate` (with its resolved file identity, if any) is
    /// targeted by this matcher. `file_id_of` and `is_descendant_of` are
    /// supplied by the caller because both require state `ring-core` does
    /// not own (the file table, the link graph).
    pub fn matches(
        self,
        candidate: &Request,
        file_id_of: impl FnOnce(&Request) -> Option<u64>,
        is_descendant_of: impl FnOnce(RequestId, RequestId) -> bool,
    ) -> bool {
        match self {
            CancelMatcher::ByUserData(user_data) => candidate.user_data == user_data,
            CancelMatcher::ByOwningTask(task) => candidate.owning_task == task,
            CancelMatcher::ByFileSet(file_id) => file_id_of(candidate) == Some(file_id),
            CancelMatcher::ByLinkDescendant(root) => is_descendant_of(root, candidate.id),
        }
    }
}

/// Outcome reported for each attempted cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The target was found and a cancellation was initiated; its
    /// completion (with `-ECANCELED`, or whatever result it already had in
    /// flight) will arrive through the normal completion path.
    Initiated,
    /// No live request matched.
    NotFound,
    /// The target was found but had already reached a terminal state —
    /// racing a cancel against a completion is not an error (§4.9).
    AlreadyDone,
}

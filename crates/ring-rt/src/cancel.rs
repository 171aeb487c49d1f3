//! `CancellationRegistry` — default cancellation bookkeeping (§4.9).
//!
//! Tracks which `(RequestId, owning task, file identity, user_data)`
//! tuples are still live, so a `ring_core::cancel::CancelMatcher` has a
//! candidate set to walk without the dispatcher needing its own ad-hoc
//! index. This registry resolves all four matcher kinds directly rather
//! than delegating to `CancelMatcher::matches` (which expects a live
//! `&Request`) — the dispatcher calls this before it has necessarily
//! taken the request pool's lock for every candidate.

use std::collections::HashMap;
use std::sync::Mutex;

use ring_core::cancel::{CancelMatcher, CancelOutcome};
use ring_core::descriptor::UserData;
use ring_core::request::{RequestId, TaskId};

use crate::link::LinkGraph;

struct LiveEntry {
    owning_task: TaskId,
    file_id: Option<u64>,
    user_data: UserData,
}

pub struct CancellationRegistry {
    live: Mutex<HashMap<RequestId, LiveEntry>>,
}

impl Default for CancellationRegistry {
    fn default() -> Self {
        Self { live: Mutex::new(HashMap::new()) }
    }
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, id: RequestId, owning_task: TaskId, file_id: Option<u64>, user_data: UserData) {
        self.live.lock().unwrap().insert(id, LiveEntry { owning_task, file_id, user_data });
    }

    pub fn untrack(&self, id: RequestId) {
        self.live.lock().unwrap().remove(&id);
    }

    /// Find every live request the matcher targets. Returns request ids
    /// only — the caller owns the actual cancellation side effects (state
    /// transition, completion with `-ECANCELED`), since this registry
    /// doesn't hold request objects, only their identity.
    pub fn find_matches(&self, matcher: CancelMatcher, links: &LinkGraph) -> Vec<RequestId> {
        let live = self.live.lock().unwrap();
        live.iter()
            .filter_map(|(&id, entry)| {
                let matched = match matcher {
                    CancelMatcher::ByUserData(target) => entry.user_data == target,
                    CancelMatcher::ByOwningTask(task) => entry.owning_task == task,
                    CancelMatcher::ByFileSet(file_id) => entry.file_id == Some(file_id),
                    CancelMatcher::ByLinkDescendant(root) => links.descendants(root).contains(&id),
                };
                matched.then_some(id)
            })
            .collect()
    }

    pub fn outcome_for(&self, id: RequestId) -> CancelOutcome {
        if self.live.lock().unwrap().contains_key(&id) {
            CancelOutcome::Initiated
        } else {
            CancelOutcome::NotFound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_by_user_data_and_owning_task() {
        let reg = CancellationRegistry::new();
        let links = LinkGraph::new();
        reg.track(RequestId(1), TaskId(9), None, UserData(7));
        reg.track(RequestId(2), TaskId(9), None, UserData(8));

        let by_ud = reg.find_matches(CancelMatcher::ByUserData(UserData(7)), &links);
        assert_eq!(by_ud, vec![RequestId(1)]);

        let mut by_task = reg.find_matches(CancelMatcher::ByOwningTask(TaskId(9)), &links);
        by_task.sort();
        assert_eq!(by_task, vec![RequestId(1), RequestId(2)]);

        reg.untrack(RequestId(1));
        assert_eq!(reg.outcome_for(RequestId(1)), CancelOutcome::NotFound);
        assert_eq!(reg.outcome_for(RequestId(2)), CancelOutcome::Initiated);
    }
}

//! `RequestPool` — default request-object pool (§4.2).
//!
//! Allocation tries, in order: a bulk allocation sized to the current
//! batch; a one-at-a-time fallback for whatever the bulk pass couldn't
//! cover; and finally the per-pool singleton *fallback request*, protected
//! by a lock bit, which exists purely to guarantee forward progress when
//! the process is under enough memory pressure that even one-at-a-time
//! allocation fails.
//!
//! Free is symmetric: per-task free lists accumulate until they reach
//! `FREE_BATCH` entries, then return to the shared free slab in one pass.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use ring_core::descriptor::{SubmitFlags, UserData};
use ring_core::error::{EngineError, Result};
use ring_core::request::{Request, RequestId, TaskId};

/// Per-task free batch accumulates until it reaches this size (§4.2).
const FREE_BATCH: usize = 8;

struct Slab {
    slots: Vec<Option<Request>>,
    free_list: Vec<u32>,
}

pub struct RequestPool {
    slab: Mutex<Slab>,
    /// Per-task accumulation of freed slot indices, flushed to the shared
    /// free list once a task's batch reaches `FREE_BATCH`.
    pending_free: Mutex<HashMap<TaskId, Vec<u32>>>,
    /// The singleton fallback request slot, reserved for forward progress
    /// under memory pressure. `in_use` is the lock bit.
    fallback_in_use: AtomicBool,
    fallback_slot: Mutex<Option<Request>>,
    capacity: u32,
}

impl RequestPool {
    pub fn new(capacity: u32) -> Self {
        Self {
            slab: Mutex::new(Slab {
                slots: (0..capacity).map(|_| None).collect(),
                free_list: (0..capacity).rev().collect(),
            }),
            pending_free: Mutex::new(HashMap::new()),
            fallback_in_use: AtomicBool::new(false),
            fallback_slot: Mutex::new(None),
            capacity,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Allocate `count` requests in one batch. Fast path: a single pass
    /// over the shared free list. Any shortfall (free list ran dry) is
    /// reported to the caller, who falls back to `allocate_one`, and
    /// ultimately to `allocate_fallback`.
    pub fn allocate_batch(
        &self,
        count: usize,
        opcode_at: impl Fn(usize) -> u8,
        flags_at: impl Fn(usize) -> SubmitFlags,
        user_data_at: impl Fn(usize) -> UserData,
        owning_task: TaskId,
    ) -> Vec<Result<RequestId>> {
        let mut out = Vec::with_capacity(count);
        let mut slab = self.slab.lock().unwrap();
        for i in 0..count {
            match slab.free_list.pop() {
                Some(index) => {
                    let id = RequestId(index);
                    slab.slots[index as usize] = Some(Request::new(
                        id,
                        opcode_at(i),
                        flags_at(i),
                        user_data_at(i),
                        owning_task,
                    ));
                    out.push(Ok(id));
                }
                None => out.push(Err(EngineError::PoolExhausted)),
            }
        }
        out
    }

    /// One-at-a-time fallback when a batch slot came up short.
    pub fn allocate_one(
        &self,
        opcode: u8,
        flags: SubmitFlags,
        user_data: UserData,
        owning_task: TaskId,
    ) -> Result<RequestId> {
        let mut slab = self.slab.lock().unwrap();
        let index = slab.free_list.pop().ok_or(EngineError::PoolExhausted)?;
        let id = RequestId(index);
        slab.slots[index as usize] = Some(Request::new(id, opcode, flags, user_data, owning_task));
        Ok(id)
    }

    /// Last-resort allocation from the singleton fallback slot. Only one
    /// caller may hold it at a time; the lock bit makes that explicit
    /// rather than relying on the pool mutex (the fallback slot is meant
    /// to survive even when the main slab's mutex is contended under
    /// pressure).
    pub fn allocate_fallback(
        &self,
        opcode: u8,
        flags: SubmitFlags,
        user_data: UserData,
        owning_task: TaskId,
    ) -> Result<RequestId> {
        if self
            .fallback_in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::PoolExhausted);
        }
        let id = RequestId(u32::MAX);
        *self.fallback_slot.lock().unwrap() =
            Some(Request::new(id, opcode, flags, user_data, owning_task));
        Ok(id)
    }

    /// Run `f` with mutable access to the request at `id`. Returns `None`
    /// if the slot is empty (already freed) — callers treat that as "this
    /// request is gone," never as an error worth propagating, since races
    /// between completion and late cancellation are expected (§4.9).
    pub fn with_request<R>(&self, id: RequestId, f: impl FnOnce(&mut Request) -> R) -> Option<R> {
        if id.0 == u32::MAX {
            let mut guard = self.fallback_slot.lock().unwrap();
            return guard.as_mut().map(f);
        }
        let mut slab = self.slab.lock().unwrap();
        slab.slots
            .get_mut(id.0 as usize)
            .and_then(|slot| slot.as_mut())
            .map(f)
    }

    /// Queue `id` for return to the free list under `owning_task`'s batch.
    /// Flushes the batch to the shared slab once it reaches `FREE_BATCH`.
    pub fn free(&self, id: RequestId, owning_task: TaskId) {
        if id.0 == u32::MAX {
            *self.fallback_slot.lock().unwrap() = None;
            self.fallback_in_use.store(false, Ordering::Release);
            return;
        }

        let mut pending = self.pending_free.lock().unwrap();
        let batch = pending.entry(owning_task).or_default();
        batch.push(id.0);
        if batch.len() >= FREE_BATCH {
            let batch = std::mem::take(batch);
            drop(pending);
            self.flush_free_batch(&batch);
        }
    }

    /// Force-flush every task's partial free batch. Called at engine
    /// shutdown so no freed slot is left stranded in a per-task list.
    pub fn flush_all_pending(&self) {
        let mut pending = self.pending_free.lock().unwrap();
        let batches: Vec<Vec<u32>> = std::mem::take(&mut *pending).into_values().collect();
        drop(pending);
        for batch in batches {
            self.flush_free_batch(&batch);
        }
    }

    fn flush_free_batch(&self, batch: &[u32]) {
        let mut slab = self.slab.lock().unwrap();
        for &index in batch {
            slab.slots[index as usize] = None;
            slab.free_list.push(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_allocate_then_free_batch() {
        let pool = RequestPool::new(16);
        let task = TaskId(1);
        let results = pool.allocate_batch(
            4,
            |_| 0,
            |_| SubmitFlags::from_bits(0),
            |i| UserData(i as u64),
            task,
        );
        let ids: Vec<RequestId> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(ids.len(), 4);

        for id in &ids[..3] {
            pool.free(*id, task);
        }
        // Below FREE_BATCH, not yet returned to the shared free list.
        assert_eq!(pool.slab.lock().unwrap().free_list.len(), 12);
    }

    #[test]
    fn exhaustion_falls_back_to_singleton() {
        let pool = RequestPool::new(1);
        let task = TaskId(1);
        let first = pool.allocate_one(0, SubmitFlags::from_bits(0), UserData(1), task);
        assert!(first.is_ok());
        let second = pool.allocate_one(0, SubmitFlags::from_bits(0), UserData(2), task);
        assert!(second.is_err());

        let fallback = pool.allocate_fallback(0, SubmitFlags::from_bits(0), UserData(3), task);
        assert!(fallback.is_ok());
        let fallback_again = pool.allocate_fallback(0, SubmitFlags::from_bits(0), UserData(4), task);
        assert!(fallback_again.is_err());
    }
}

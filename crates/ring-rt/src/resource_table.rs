//! `ResourceTable<T>` — default node-replacement implementation (§4.3).
//!
//! Registers either fixed files or fixed buffers — `T` is whatever owning
//! handle the application wants cheap index-based access to. `update`
//! never mutates slots in place: it builds a whole new node (a fresh
//! `Vec<Option<T>>`) and publishes it with one `Arc` swap, keeping the
//! node it just replaced reachable as `previous`. That's what makes §8
//! law 5 hold — "a concurrent submission using the old slot observes
//! either the old or the new file but never a freed reference": a reader
//! who read `slot.generation` just before an `update` still finds that
//! generation in `previous` and gets the old value back, rather than an
//! error. Only a read against a generation older than `previous` (i.e.
//! one that predates the update *before* the most recent one) is treated
//! as stale, since nothing keeps that node alive any more.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use ring_core::error::{EngineError, Result};
use ring_core::resource::{ResourceTable as ResourceTableTrait, SlotRef};

struct Node<T> {
    slots: Vec<Option<T>>,
    generation: u32,
}

pub struct ResourceTable<T> {
    current: RwLock<Arc<Node<T>>>,
    previous: RwLock<Option<Arc<Node<T>>>>,
    next_generation: AtomicU32,
}

impl<T> Default for ResourceTable<T> {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(Node { slots: Vec::new(), generation: 0 })),
            previous: RwLock::new(None),
            next_generation: AtomicU32::new(1),
        }
    }
}

impl<T> ResourceTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap `node` in as current, demoting whatever was current into
    /// `previous` so its generation stays acquirable for one more update.
    fn publish(&self, node: Arc<Node<T>>) {
        let old = std::mem::replace(&mut *self.current.write().unwrap(), node);
        *self.previous.write().unwrap() = Some(old);
    }
}

impl<T: Clone> ResourceTableTrait<T> for ResourceTable<T> {
    fn register(&self, items: Vec<Option<T>>) -> Result<()> {
        let generation = self.next_generation.fetch_add(1, Ordering::AcqRel);
        self.publish(Arc::new(Node { slots: items, generation }));
        Ok(())
    }

    fn update(&self, updates: Vec<(u32, Option<T>)>) -> Result<()> {
        let generation = self.next_generation.fetch_add(1, Ordering::AcqRel);
        let mut slots = self.current.read().unwrap().slots.clone();
        for (index, value) in updates {
            let index = index as usize;
            if index >= slots.len() {
                return Err(EngineError::SlotOutOfRange(index as u16));
            }
            slots[index] = value;
        }
        self.publish(Arc::new(Node { slots, generation }));
        Ok(())
    }

    fn acquire(&self, slot: SlotRef) -> Result<Option<T>>
    where
        T: Clone,
    {
        let current = Arc::clone(&self.current.read().unwrap());
        if current.generation == slot.generation {
            return current.slots.get(slot.index as usize).cloned().ok_or(EngineError::SlotOutOfRange(slot.index as u16));
        }
        if let Some(previous) = self.previous.read().unwrap().clone() {
            if previous.generation == slot.generation {
                return previous.slots.get(slot.index as usize).cloned().ok_or(EngineError::SlotOutOfRange(slot.index as u16));
            }
        }
        // More than one update behind `previous` — nothing retains that
        // generation any more (§8 law 5 only promises "old or new" across
        // a single concurrent update, not an unbounded backlog).
        Err(EngineError::SlotOutOfRange(slot.index as u16))
    }

    fn len(&self) -> usize {
        self.current.read().unwrap().slots.len()
    }

    fn current_generation(&self) -> u32 {
        self.current.read().unwrap().generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_acquire() {
        let table: ResourceTable<i32> = ResourceTable::new();
        table.register(vec![Some(10), None, Some(30)]).unwrap();
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn update_bumps_generation_but_keeps_previous_value_readable() {
        let table: ResourceTable<i32> = ResourceTable::new();
        table.register(vec![Some(1)]).unwrap();
        let stale = SlotRef { index: 0, generation: table.current.read().unwrap().generation };
        table.update(vec![(0, Some(2))]).unwrap();

        // A slot reference taken just before the update still resolves —
        // to the old value, never an error (§8 law 5).
        assert_eq!(table.acquire(stale).unwrap(), Some(1));

        let fresh = SlotRef { index: 0, generation: table.current_generation() };
        assert_eq!(table.acquire(fresh).unwrap(), Some(2));
    }

    #[test]
    fn acquire_errors_once_a_generation_falls_off_the_back() {
        let table: ResourceTable<i32> = ResourceTable::new();
        table.register(vec![Some(1)]).unwrap();
        let oldest = SlotRef { index: 0, generation: table.current_generation() };
        table.update(vec![(0, Some(2))]).unwrap();
        table.update(vec![(0, Some(3))]).unwrap();

        assert!(table.acquire(oldest).is_err());
    }

    #[test]
    fn slot_out_of_range_is_rejected() {
        let table: ResourceTable<i32> = ResourceTable::new();
        table.register(vec![Some(1)]).unwrap();
        let result = table.update(vec![(5, Some(2))]);
        assert!(matches!(result, Err(EngineError::SlotOutOfRange(5))));
    }
}

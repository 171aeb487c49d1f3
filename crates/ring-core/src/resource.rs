//! Registered resource tables — fixed files and fixed buffers (§3, §4.3).
//!
//! Registration is abstractly modeled here; `ring-rt::resource` provides
//! the node-replacement implementation. The table maps small integer
//! slots to kernel objects (or, in this opaque model, to whatever owning
//! handle type `T` the application supplies) without atomic-refcount
//! traffic on every I/O.

use crate::error::Result;

/// A generation-tagged slot. The generation increments every time the
/// slot's contents are replaced via `update`, so a request holding a
/// stale `(index, generation)` pair can detect that its file was swapped
/// out from under it rather than silently observing a freed reference —
/// the data-model invariant in §8 law 5 ("a concurrent submission using
/// the old slot observes either the old or the new file but never a freed
/// reference").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
    pub index: u32,
    pub generation: u32,
}

/// A registered, index-keyed pool of owning references.
///
/// # Implementors
///
/// - `ring_rt::resource_table::ResourceTable<T>` (default): node-
///   replacement — `update` builds a whole new node and publishes it with
///   one pointer swap, keeping the just-superseded node reachable for one
///   more generation so a reader who captured its `SlotRef` just before
///   the swap still resolves against it instead of erroring.
pub trait ResourceTable<T>: Send + Sync {
    /// Install `items` into slots `0..items.len()`. Slots beyond that
    /// range remain empty (`None`) until a later `update`.
    fn register(&self, items: Vec<Option<T>>) -> Result<()>;

    /// Replace an arbitrary subset of slots. `updates` is `(index, new
    /// value)` pairs; slots not mentioned are untouched. The previous
    /// node stays acquirable by its own generation until the *next*
    /// `update` or `register` supersedes it in turn.
    fn update(&self, updates: Vec<(u32, Option<T>)>) -> Result<()>;

    /// Clone out the value at `slot`, resolved against whichever
    /// generation — current or immediately-previous — `slot.generation`
    /// names (§8 law 5: "old or new, never a freed reference"). Errors
    /// only if `slot` names neither.
    fn acquire(&self, slot: SlotRef) -> Result<Option<T>>
    where
        T: Clone;

    /// Number of slots currently registered (capacity of the live node).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The generation of the currently-published node. A caller that wants
    /// "whatever is live right now" at `index` (rather than pinning to a
    /// generation it captured earlier) builds `SlotRef { index, generation:
    /// current_generation() }` immediately before `acquire`.
    fn current_generation(&self) -> u32;
}

//! Ingestion queues.
//!
//! Network threads write, the tick drains. Each queue is a keyed container
//! behind its own short-lived lock: producers only ever hold it for a single
//! insert and never wait on the tick. Draining swaps the container for a fresh
//! one, so an entry arriving during a tick lands in the next tick's batch.
//!
//! A closed queue drops every write. Closing happens once, at teardown.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use world_shared::entity::{AnimationUpdate, EntityId, MoveUpdate};

#[derive(Debug)]
struct Slot<C> {
    items: C,
    closed: bool,
}

impl<C: Default> Default for Slot<C> {
    fn default() -> Self {
        Self {
            items: C::default(),
            closed: false,
        }
    }
}

/// Last-write-wins map from entity id to the newest value.
#[derive(Debug)]
pub struct KeyedQueue<V> {
    slot: Mutex<Slot<HashMap<EntityId, V>>>,
}

impl<V> Default for KeyedQueue<V> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
        }
    }
}

impl<V> KeyedQueue<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` for `id`, replacing any older value. Returns false if
    /// the queue is closed.
    pub fn enqueue(&self, id: EntityId, value: V) -> bool {
        let mut slot = self.slot.lock();
        if slot.closed {
            return false;
        }
        slot.items.insert(id, value);
        true
    }

    /// Takes everything queued so far.
    pub fn drain_all(&self) -> HashMap<EntityId, V> {
        std::mem::take(&mut self.slot.lock().items)
    }

    pub fn len(&self) -> usize {
        self.slot.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().items.is_empty()
    }

    /// Empties the queue and rejects all future writes.
    pub fn close(&self) {
        let mut slot = self.slot.lock();
        slot.items.clear();
        slot.closed = true;
    }
}

/// Deduplicated set of ids waiting to be removed.
#[derive(Debug, Default)]
pub struct DeletionQueue {
    slot: Mutex<Slot<HashSet<EntityId>>>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` for removal. Returns true only if it was not already marked
    /// and the queue is open.
    pub fn request(&self, id: EntityId) -> bool {
        let mut slot = self.slot.lock();
        !slot.closed && slot.items.insert(id)
    }

    /// Takes every marked id, in ascending order.
    pub fn drain_all(&self) -> Vec<EntityId> {
        let taken = std::mem::take(&mut self.slot.lock().items);
        let mut ids: Vec<_> = taken.into_iter().collect();
        ids.sort_unstable();
        ids
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.slot.lock().items.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.slot.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().items.is_empty()
    }

    pub fn close(&self) {
        let mut slot = self.slot.lock();
        slot.items.clear();
        slot.closed = true;
    }
}

/// The three queues fed by the network layer.
#[derive(Debug, Default)]
pub struct IngestionQueues {
    pub moves: KeyedQueue<MoveUpdate>,
    pub animations: KeyedQueue<AnimationUpdate>,
    pub deletions: DeletionQueue,
}

/// One tick's worth of drained work.
#[derive(Debug, Default)]
pub struct DrainedBatch {
    pub deletions: Vec<EntityId>,
    pub moves: HashMap<EntityId, MoveUpdate>,
    pub animations: HashMap<EntityId, AnimationUpdate>,
}

impl IngestionQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swaps out all three queues.
    pub fn drain(&self) -> DrainedBatch {
        DrainedBatch {
            deletions: self.deletions.drain_all(),
            moves: self.moves.drain_all(),
            animations: self.animations.drain_all(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty() && self.animations.is_empty() && self.deletions.is_empty()
    }

    pub fn close(&self) {
        self.moves.close();
        self.animations.close();
        self.deletions.close();
    }
}

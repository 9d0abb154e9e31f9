//! Presentation abstraction.
//!
//! The core never builds meshes or name plates itself. It owns local handles
//! through [`EntityHandle`] and receives new ones from a [`CharacterFactory`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;
use world_shared::{
    entity::{AnimationUpdate, CharacterDescriptor, EntityId},
    math::Vec3,
};

/// A materialized local entity.
pub trait EntityHandle: Send + Sync + 'static {
    /// False once the underlying presentation object is gone.
    fn is_usable(&self) -> bool {
        true
    }

    fn move_to(&mut self, position: Vec3, heading: f32);

    fn animate(&mut self, update: &AnimationUpdate);

    /// Detaches presentation (name plate, visibility) ahead of disposal.
    fn hide(&mut self);

    /// Releases the handle for good.
    fn dispose(self);
}

/// Builds local handles for admitted entities.
///
/// Returning `None` leaves the entity pending.
#[async_trait]
pub trait CharacterFactory<H: EntityHandle>: Send + Sync {
    async fn build(&self, id: EntityId, descriptor: CharacterDescriptor) -> Option<H>;
}

/// Something that happened to a headless handle.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleEvent {
    Built { name: String },
    Moved { position: Vec3, heading: f32 },
    Animated(AnimationUpdate),
    Hidden,
    Disposed,
}

/// Shared, append-only record of handle events.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<(EntityId, HandleEvent)>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: EntityId, event: HandleEvent) {
        trace!(%id, ?event, "Handle event");
        self.events.lock().push((id, event));
    }

    pub fn events_for(&self, id: EntityId) -> Vec<HandleEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(eid, _)| *eid == id)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn count(&self, id: EntityId, pred: impl Fn(&HandleEvent) -> bool) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(eid, e)| *eid == id && pred(e))
            .count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

/// Handle with no renderer behind it.
#[derive(Debug)]
pub struct HeadlessHandle {
    pub id: EntityId,
    pub name: String,
    pub position: Vec3,
    pub heading: f32,
    pub visible: bool,
    usable: bool,
    journal: Journal,
}

impl HeadlessHandle {
    pub fn new(id: EntityId, descriptor: &CharacterDescriptor, journal: Journal) -> Self {
        journal.record(
            id,
            HandleEvent::Built {
                name: descriptor.name.clone(),
            },
        );
        Self {
            id,
            name: descriptor.name.clone(),
            position: descriptor.position,
            heading: descriptor.heading,
            visible: true,
            usable: true,
            journal,
        }
    }

    /// Simulates the presentation object being destroyed underneath us.
    pub fn break_presentation(&mut self) {
        self.usable = false;
    }
}

impl EntityHandle for HeadlessHandle {
    fn is_usable(&self) -> bool {
        self.usable
    }

    fn move_to(&mut self, position: Vec3, heading: f32) {
        self.position = position;
        self.heading = heading;
        self.journal
            .record(self.id, HandleEvent::Moved { position, heading });
    }

    fn animate(&mut self, update: &AnimationUpdate) {
        self.journal.record(self.id, HandleEvent::Animated(*update));
    }

    fn hide(&mut self) {
        self.visible = false;
        self.journal.record(self.id, HandleEvent::Hidden);
    }

    fn dispose(self) {
        self.journal.record(self.id, HandleEvent::Disposed);
    }
}

/// Factory producing [`HeadlessHandle`]s, optionally refusing some ids.
#[derive(Debug, Clone, Default)]
pub struct HeadlessFactory {
    journal: Journal,
    refuse: Arc<Mutex<Vec<EntityId>>>,
}

impl HeadlessFactory {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            refuse: Arc::default(),
        }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Makes future builds for `id` fail silently.
    pub fn refuse(&self, id: EntityId) {
        self.refuse.lock().push(id);
    }
}

#[async_trait]
impl CharacterFactory<HeadlessHandle> for HeadlessFactory {
    async fn build(&self, id: EntityId, descriptor: CharacterDescriptor) -> Option<HeadlessHandle> {
        if self.refuse.lock().contains(&id) {
            return None;
        }
        Some(HeadlessHandle::new(id, &descriptor, self.journal.clone()))
    }
}

//! Entity registry.
//!
//! Concurrent map from authority id to local state. An id moves through
//! `absent -> Pending -> Active -> absent`; every transition here is a single
//! map operation so it is atomic with respect to other callers. Which callers
//! may perform which transition is decided by [`crate::session::WorldSession`].

use std::time::{Duration, Instant};

use dashmap::{mapref::entry::Entry, DashMap};
use world_shared::{entity::EntityId, math::Vec3};

use crate::{error::SyncError, presentation::EntityHandle};

/// A materialized entity and its last applied transform.
#[derive(Debug)]
pub struct ActiveEntity<H> {
    pub handle: H,
    pub position: Vec3,
    pub heading: f32,
}

/// Registry value.
#[derive(Debug)]
pub enum EntityRecord<H> {
    /// Creation in flight. Holds the spawn transform from the descriptor.
    Pending {
        reserved_at: Instant,
        position: Vec3,
        heading: f32,
    },
    Active(ActiveEntity<H>),
}

impl<H> EntityRecord<H> {
    pub fn is_pending(&self) -> bool {
        matches!(self, EntityRecord::Pending { .. })
    }

    pub fn is_active(&self) -> bool {
        matches!(self, EntityRecord::Active(_))
    }
}

/// Lightweight copy of a record's state for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Pending,
    Active,
}

#[derive(Debug)]
pub struct EntityRegistry<H> {
    records: DashMap<EntityId, EntityRecord<H>>,
}

impl<H> Default for EntityRegistry<H> {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl<H: EntityHandle> EntityRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: EntityId) -> Option<RecordState> {
        self.records.get(&id).map(|r| match r.value() {
            EntityRecord::Pending { .. } => RecordState::Pending,
            EntityRecord::Active(_) => RecordState::Active,
        })
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.records.contains_key(&id)
    }

    /// Last known position of an active entity.
    pub fn position_of(&self, id: EntityId) -> Option<Vec3> {
        self.records.get(&id).and_then(|r| match r.value() {
            EntityRecord::Active(a) => Some(a.position),
            EntityRecord::Pending { .. } => None,
        })
    }

    /// Reserves `id` as pending. Fails if the id is already known.
    pub fn reserve(
        &self,
        id: EntityId,
        position: Vec3,
        heading: f32,
        now: Instant,
    ) -> Result<(), SyncError> {
        match self.records.entry(id) {
            Entry::Occupied(_) => Err(SyncError::DuplicateAdmission),
            Entry::Vacant(v) => {
                v.insert(EntityRecord::Pending {
                    reserved_at: now,
                    position,
                    heading,
                });
                Ok(())
            }
        }
    }

    /// Promotes a pending id to active. On failure the handle is returned so
    /// the caller can dispose of it.
    pub fn activate(&self, id: EntityId, handle: H) -> Result<(), (SyncError, H)> {
        let Some(mut record) = self.records.get_mut(&id) else {
            return Err((SyncError::StaleMaterialization, handle));
        };
        let (position, heading) = match *record {
            EntityRecord::Pending {
                position, heading, ..
            } => (position, heading),
            EntityRecord::Active(_) => return Err((SyncError::StaleMaterialization, handle)),
        };
        *record = EntityRecord::Active(ActiveEntity {
            handle,
            position,
            heading,
        });
        Ok(())
    }

    /// Runs `f` against an active entity. `None` if the id is pending or
    /// absent.
    pub fn with_active<R>(&self, id: EntityId, f: impl FnOnce(&mut ActiveEntity<H>) -> R) -> Option<R> {
        let mut record = self.records.get_mut(&id)?;
        match record.value_mut() {
            EntityRecord::Active(active) => Some(f(active)),
            EntityRecord::Pending { .. } => None,
        }
    }

    /// Removes an active entity, leaving pending ids untouched.
    pub fn remove_active(&self, id: EntityId) -> Option<ActiveEntity<H>> {
        match self.records.remove_if(&id, |_, r| r.is_active()) {
            Some((_, EntityRecord::Active(active))) => Some(active),
            _ => None,
        }
    }

    /// Drops pending ids reserved more than `timeout` before `now`.
    pub fn reap_pending(&self, now: Instant, timeout: Duration) -> Vec<EntityId> {
        let mut reaped = Vec::new();
        self.records.retain(|id, record| match record {
            EntityRecord::Pending { reserved_at, .. }
                if now.saturating_duration_since(*reserved_at) > timeout =>
            {
                reaped.push(*id);
                false
            }
            _ => true,
        });
        reaped.sort_unstable();
        reaped
    }

    /// Empties the registry, returning every record.
    pub fn drain(&self) -> Vec<(EntityId, EntityRecord<H>)> {
        let ids: Vec<EntityId> = self.records.iter().map(|r| *r.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.records.remove(&id))
            .collect()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.records.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_pending()).count()
    }

    pub fn active_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_active()).count()
    }
}

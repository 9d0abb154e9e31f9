//! Entity lifecycle: admission, materialization, removal, teardown.

use std::{
    sync::atomic::Ordering,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};
use world_shared::entity::{CharacterDescriptor, EntityId};

use crate::{
    error::SyncError,
    presentation::EntityHandle,
    registry::EntityRecord,
    session::{TickState, WorldSession},
};

impl<H: EntityHandle> WorldSession<H> {
    /// First sighting of an entity.
    ///
    /// Admits `id` as pending and queues its descriptor for creation, unless
    /// the id is already known or the descriptor lies outside the visibility
    /// radius. Out-of-range descriptors never touch the registry.
    pub fn observe_entity(
        &self,
        id: EntityId,
        descriptor: CharacterDescriptor,
    ) -> Result<(), SyncError> {
        self.observe_entity_at(id, descriptor, Instant::now())
    }

    pub fn observe_entity_at(
        &self,
        id: EntityId,
        descriptor: CharacterDescriptor,
        now: Instant,
    ) -> Result<(), SyncError> {
        let mut creation = self.creation.lock();
        if self.is_exiting() {
            return Err(SyncError::SessionClosed);
        }
        if self.registry.contains(id) {
            debug!(%id, "Duplicate sighting ignored");
            return Err(SyncError::DuplicateAdmission);
        }
        let viewer = self.viewer.viewer();
        if !self.policy.is_visible(viewer.position, descriptor.position) {
            debug!(%id, "Sighting out of range");
            return Err(SyncError::OutOfRange);
        }
        self.registry
            .reserve(id, descriptor.position, descriptor.heading, now)?;
        debug!(%id, name = %descriptor.name, "Entity admitted");
        creation.insert(id, descriptor);
        Ok(())
    }

    /// Takes every admitted descriptor for the presentation side.
    pub fn drain_creations(&self) -> Vec<(EntityId, CharacterDescriptor)> {
        let mut taken: Vec<_> = std::mem::take(&mut *self.creation.lock())
            .into_iter()
            .collect();
        taken.sort_unstable_by_key(|(id, _)| *id);
        taken
    }

    /// Completes creation of a pending entity.
    ///
    /// A handle for an id that is not pending is disposed on the spot.
    pub fn materialize_entity(&self, id: EntityId, handle: H) -> Result<(), SyncError> {
        let _creation = self.creation.lock();
        if self.is_exiting() {
            handle.dispose();
            return Err(SyncError::SessionClosed);
        }
        match self.registry.activate(id, handle) {
            Ok(()) => {
                debug!(%id, "Entity materialized");
                Ok(())
            }
            Err((err, handle)) => {
                warn!(%id, error = %err, "Stale materialization ignored");
                handle.dispose();
                Err(err)
            }
        }
    }

    /// Marks `id` for removal on the next tick. Idempotent until then.
    pub fn request_deletion(&self, id: EntityId) -> bool {
        let queued = self.queues.deletions.request(id);
        if queued {
            debug!(%id, "Deletion requested");
        }
        queued
    }

    /// Removes an active entity: hide now, dispose after the delay. Pending or
    /// unknown ids are left alone.
    pub(crate) fn apply_deletion(
        &self,
        state: &mut TickState<H>,
        id: EntityId,
        now: Instant,
    ) -> bool {
        let Some(mut active) = self.registry.remove_active(id) else {
            debug!(%id, "Deletion for non-active entity skipped");
            return false;
        };
        if active.handle.is_usable() {
            active.handle.hide();
        } else {
            warn!(%id, error = %SyncError::MissingHandle, "Removing entity without presentation");
        }
        state.disposals.schedule(active.handle, now);
        debug!(%id, "Entity removed");
        true
    }

    /// Drops placeholders whose creation never completed.
    pub(crate) fn reap_orphans(&self, now: Instant, timeout: Duration) -> usize {
        let mut creation = self.creation.lock();
        let reaped = self.registry.reap_pending(now, timeout);
        for id in &reaped {
            creation.remove(id);
            warn!(%id, ?timeout, "Orphaned pending entity dropped");
        }
        reaped.len()
    }

    /// Leaves the world.
    ///
    /// Disposes every active entity and every scheduled disposal at once,
    /// forgets pending ids and closes all queues. Safe to call while a tick is
    /// running; it waits for that tick to finish. Later calls are no-ops.
    pub fn teardown_all(&self) {
        if self.exiting.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.tick_state.lock();
        let mut creation = self.creation.lock();

        self.queues.close();
        creation.clear();

        let mut disposed = state.disposals.flush();
        let mut forgotten = 0;
        for (_, record) in self.registry.drain() {
            match record {
                EntityRecord::Active(active) => {
                    active.handle.dispose();
                    disposed += 1;
                }
                EntityRecord::Pending { .. } => forgotten += 1,
            }
        }
        self.viewer.on_world_exit();
        info!(disposed, forgotten, ticks = state.ticks, "World session torn down");
    }
}

//! Shared fixtures for the integration tests.

use std::{sync::Arc, time::Duration};

use world_client::{
    outbound::RecordingOutbound,
    presentation::{HeadlessHandle, Journal},
    session::{SessionSettings, WorldSession},
    viewer::SharedViewer,
};
use world_shared::{
    entity::{CharacterDescriptor, EntityId, MoveUpdate},
    math::Vec3,
};

/// Routes tracing output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// A session viewed from the origin, wired to in-memory collaborators.
pub struct Harness {
    pub session: Arc<WorldSession<HeadlessHandle>>,
    pub outbound: Arc<RecordingOutbound>,
    pub viewer: Arc<SharedViewer>,
    pub journal: Journal,
}

impl Harness {
    pub fn at_origin(radius: f32) -> Self {
        let outbound = Arc::new(RecordingOutbound::new());
        let viewer = Arc::new(SharedViewer::new(Vec3::ZERO, 0.0));
        let session = Arc::new(WorldSession::new(
            SessionSettings {
                visibility_radius: radius,
                disposal_delay: Duration::ZERO,
                pending_timeout: None,
            },
            viewer.clone(),
            outbound.clone(),
        ));
        Self {
            session,
            outbound,
            viewer,
            journal: Journal::new(),
        }
    }

    /// Admits and materializes `id` at `position`.
    pub fn spawn_active(&self, id: u64, position: Vec3) {
        let desc = descriptor_at(position);
        self.session
            .observe_entity(EntityId(id), desc.clone())
            .expect("admission");
        let handle = HeadlessHandle::new(EntityId(id), &desc, self.journal.clone());
        self.session
            .materialize_entity(EntityId(id), handle)
            .expect("materialization");
    }
}

pub fn descriptor_at(position: Vec3) -> CharacterDescriptor {
    CharacterDescriptor::at("npc", position, 0.0)
}

pub fn move_to(id: u64, position: Vec3) -> MoveUpdate {
    MoveUpdate {
        id: EntityId(id),
        position,
        heading: 0.0,
    }
}

//! Per-session synchronization context.
//!
//! A `WorldSession` is built when the player enters the world and torn down
//! when they leave. Network threads share it through an `Arc` and feed it
//! through the producer methods below; the frame loop calls
//! [`WorldSession::tick`].
//!
//! # Regions
//!
//! Two locks guard disjoint concerns and are never merged:
//!
//! * **creation region** (`creation`): the creation queue and every
//!   transition into or out of `Pending` (admission, materialization,
//!   orphan reaping). Network threads take it at arbitrary times.
//! * **tick region** (`tick_state`): the apply path over `Active` records and
//!   the disposal schedule. Held for a whole tick and for teardown.
//!
//! When both are needed the order is tick region, then creation region.
//! The ingestion queues carry their own internal locks and never wait on
//! either region.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tracing::trace;
use world_shared::{
    config::SyncConfig,
    entity::{AnimationUpdate, CharacterDescriptor, EntityId, MoveUpdate},
};

use crate::{
    disposal::DisposalSchedule,
    distance::VisibilityPolicy,
    outbound::Outbound,
    presentation::EntityHandle,
    queues::IngestionQueues,
    registry::EntityRegistry,
    viewer::ViewerSource,
};

/// Admitted descriptors waiting for the presentation side.
pub(crate) type CreationQueue = HashMap<EntityId, CharacterDescriptor>;

/// State owned by the tick region.
pub(crate) struct TickState<H> {
    pub(crate) disposals: DisposalSchedule<H>,
    pub(crate) ticks: u64,
}

/// Knobs taken from [`SyncConfig`].
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub visibility_radius: f32,
    pub disposal_delay: Duration,
    pub pending_timeout: Option<Duration>,
}

impl From<&SyncConfig> for SessionSettings {
    fn from(cfg: &SyncConfig) -> Self {
        Self {
            visibility_radius: cfg.visibility_radius,
            disposal_delay: cfg.disposal_delay(),
            pending_timeout: cfg.pending_timeout(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

pub struct WorldSession<H> {
    pub(crate) policy: VisibilityPolicy,
    pub(crate) pending_timeout: Option<Duration>,
    pub(crate) viewer: Arc<dyn ViewerSource>,
    pub(crate) outbound: Arc<dyn Outbound>,
    pub(crate) registry: EntityRegistry<H>,
    pub(crate) queues: IngestionQueues,
    pub(crate) creation: Mutex<CreationQueue>,
    pub(crate) tick_state: Mutex<TickState<H>>,
    pub(crate) exiting: AtomicBool,
    pub(crate) kicked: AtomicBool,
}

impl<H: EntityHandle> WorldSession<H> {
    pub fn new(
        settings: SessionSettings,
        viewer: Arc<dyn ViewerSource>,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        Self {
            policy: VisibilityPolicy::new(settings.visibility_radius),
            pending_timeout: settings.pending_timeout,
            viewer,
            outbound,
            registry: EntityRegistry::new(),
            queues: IngestionQueues::new(),
            creation: Mutex::new(CreationQueue::new()),
            tick_state: Mutex::new(TickState {
                disposals: DisposalSchedule::new(settings.disposal_delay),
                ticks: 0,
            }),
            exiting: AtomicBool::new(false),
            kicked: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> VisibilityPolicy {
        self.policy
    }

    pub fn registry(&self) -> &EntityRegistry<H> {
        &self.registry
    }

    pub fn queues(&self) -> &IngestionQueues {
        &self.queues
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.tick_state.lock().ticks
    }

    /// Handles hidden but not yet disposed.
    pub fn scheduled_disposals(&self) -> usize {
        self.tick_state.lock().disposals.len()
    }

    /// Admitted descriptors not yet taken by the presentation side.
    pub fn pending_creations(&self) -> usize {
        self.creation.lock().len()
    }

    /// Buffers a move for the next tick. Returns false after teardown.
    pub fn enqueue_move(&self, update: MoveUpdate) -> bool {
        let accepted = self.queues.moves.enqueue(update.id, update);
        trace!(id = %update.id, accepted, "Move queued");
        accepted
    }

    /// Buffers an animation state for the next tick. Returns false after
    /// teardown.
    pub fn enqueue_animation(&self, update: AnimationUpdate) -> bool {
        let accepted = self.queues.animations.enqueue(update.id, update);
        trace!(id = %update.id, accepted, "Animation queued");
        accepted
    }

    /// Asks the next tick to leave the world.
    pub fn request_kick(&self) {
        self.kicked.store(true, Ordering::Release);
    }
}

//! Synchronization tick.
//!
//! Runs once per frame on the frame thread. Each tick drains the three
//! ingestion queues and applies them in a fixed order: deletions, then
//! moves, then animations. Entities that move out of range are not removed in
//! the same pass; they are queued for deletion and go away next tick.

use std::{sync::atomic::Ordering, time::Instant};

use tracing::{debug, info, trace, warn};
use world_shared::entity::{AnimationUpdate, EntityId, MoveUpdate};

use crate::{
    error::SyncError, outbound::OutboundRequest, presentation::EntityHandle,
    session::WorldSession, viewer::Viewer,
};

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub deletions_applied: usize,
    pub moves_applied: usize,
    /// Tracked entities that moved out of range and were queued for removal.
    pub moves_faded: usize,
    /// Moves for unknown in-range ids that triggered an info request.
    pub info_requests: usize,
    pub moves_dropped: usize,
    pub animations_applied: usize,
    pub animations_dropped: usize,
    pub missing_handles: usize,
    pub disposed: usize,
    pub orphans_reaped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Applied(TickReport),
    /// The session is exiting; nothing was touched.
    Skipped,
    /// The authority removed us; the session has been torn down.
    Kicked,
}

enum MoveEffect {
    Applied,
    Faded,
    Requested,
    Dropped,
    MissingHandle,
}

impl<H: EntityHandle> WorldSession<H> {
    pub fn tick(&self) -> TickOutcome {
        self.tick_at(Instant::now())
    }

    /// Runs a tick with an explicit monotonic timestamp.
    pub fn tick_at(&self, now: Instant) -> TickOutcome {
        if self.is_exiting() {
            return TickOutcome::Skipped;
        }
        if self.kicked.load(Ordering::Acquire) {
            info!("Kicked from world, tearing down session");
            self.teardown_all();
            return TickOutcome::Kicked;
        }

        let mut state = self.tick_state.lock();
        // Teardown may have finished while we waited for the region.
        if self.is_exiting() {
            return TickOutcome::Skipped;
        }

        let viewer = self.viewer.viewer();
        let batch = self.queues.drain();
        let mut report = TickReport::default();

        for id in batch.deletions {
            if self.apply_deletion(&mut state, id, now) {
                report.deletions_applied += 1;
            }
        }

        for (id, update) in batch.moves {
            match self.apply_move(viewer, id, &update) {
                MoveEffect::Applied => report.moves_applied += 1,
                MoveEffect::Faded => report.moves_faded += 1,
                MoveEffect::Requested => report.info_requests += 1,
                MoveEffect::Dropped => report.moves_dropped += 1,
                MoveEffect::MissingHandle => report.missing_handles += 1,
            }
        }

        for (id, update) in batch.animations {
            if self.apply_animation(viewer, id, &update) {
                report.animations_applied += 1;
            } else {
                report.animations_dropped += 1;
            }
        }

        report.disposed = state.disposals.run_due(now);
        if let Some(timeout) = self.pending_timeout {
            report.orphans_reaped = self.reap_orphans(now, timeout);
        }
        state.ticks += 1;

        if report != TickReport::default() {
            debug!(tick = state.ticks, ?report, "Tick applied");
        }
        TickOutcome::Applied(report)
    }

    fn broadcast_self(&self, viewer: Viewer) {
        self.outbound.send(OutboundRequest::SelfLocationBroadcast {
            position: viewer.position,
            heading: viewer.heading,
        });
    }

    fn apply_move(&self, viewer: Viewer, id: EntityId, update: &MoveUpdate) -> MoveEffect {
        let in_range = self.policy.is_visible(viewer.position, update.position);

        let tracked = self.registry.with_active(id, |active| {
            if !active.handle.is_usable() {
                return MoveEffect::MissingHandle;
            }
            if !in_range {
                return MoveEffect::Faded;
            }
            active.handle.move_to(update.position, update.heading);
            active.position = update.position;
            active.heading = update.heading;
            MoveEffect::Applied
        });

        match tracked {
            Some(MoveEffect::Faded) => {
                debug!(%id, "Entity moved out of range");
                self.broadcast_self(viewer);
                self.queues.deletions.request(id);
                MoveEffect::Faded
            }
            Some(MoveEffect::MissingHandle) => {
                warn!(%id, error = %SyncError::MissingHandle, "Move skipped");
                MoveEffect::MissingHandle
            }
            Some(effect) => effect,
            None if self.registry.contains(id) => {
                trace!(%id, "Move for pending entity dropped");
                MoveEffect::Dropped
            }
            None if in_range => {
                debug!(%id, "Unknown entity in range, requesting info");
                self.outbound.send(OutboundRequest::ObjectInfoRequest(id));
                self.broadcast_self(viewer);
                MoveEffect::Requested
            }
            None => MoveEffect::Dropped,
        }
    }

    fn apply_animation(&self, viewer: Viewer, id: EntityId, update: &AnimationUpdate) -> bool {
        let policy = self.policy;
        self.registry
            .with_active(id, |active| {
                if !active.handle.is_usable() || !policy.is_visible(viewer.position, active.position)
                {
                    return false;
                }
                active.handle.animate(update);
                true
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        outbound::RecordingOutbound,
        presentation::{HandleEvent, HeadlessHandle, Journal},
        registry::RecordState,
        session::SessionSettings,
        viewer::SharedViewer,
    };
    use world_shared::{
        entity::{CharacterDescriptor, MotionFlags},
        math::Vec3,
    };

    struct Fixture {
        session: WorldSession<HeadlessHandle>,
        outbound: Arc<RecordingOutbound>,
        viewer: Arc<SharedViewer>,
        journal: Journal,
    }

    fn fixture() -> Fixture {
        let outbound = Arc::new(RecordingOutbound::new());
        let viewer = Arc::new(SharedViewer::new(Vec3::ZERO, 0.0));
        let session = WorldSession::new(
            SessionSettings {
                visibility_radius: 100.0,
                disposal_delay: Duration::from_millis(500),
                pending_timeout: None,
            },
            viewer.clone(),
            outbound.clone(),
        );
        Fixture {
            session,
            outbound,
            viewer,
            journal: Journal::new(),
        }
    }

    impl Fixture {
        fn spawn_active(&self, id: u64, x: f32) {
            let desc = CharacterDescriptor::at("npc", Vec3::new(x, 0.0, 0.0), 0.0);
            self.session.observe_entity(EntityId(id), desc.clone()).unwrap();
            let handle = HeadlessHandle::new(EntityId(id), &desc, self.journal.clone());
            self.session.materialize_entity(EntityId(id), handle).unwrap();
        }

        fn applied(&self, now: Instant) -> TickReport {
            match self.session.tick_at(now) {
                TickOutcome::Applied(report) => report,
                other => panic!("expected applied tick, got {other:?}"),
            }
        }
    }

    fn mv(id: u64, x: f32) -> MoveUpdate {
        MoveUpdate {
            id: EntityId(id),
            position: Vec3::new(x, 0.0, 0.0),
            heading: 0.0,
        }
    }

    fn anim(id: u64) -> AnimationUpdate {
        AnimationUpdate {
            id: EntityId(id),
            velocity_x: 1.0,
            velocity_z: 0.0,
            flags: MotionFlags::GROUNDED,
        }
    }

    #[test]
    fn only_last_move_is_applied() {
        let f = fixture();
        f.spawn_active(1, 0.0);
        f.session.enqueue_move(mv(1, 10.0));
        f.session.enqueue_move(mv(1, 20.0));

        let report = f.applied(Instant::now());
        assert_eq!(report.moves_applied, 1);

        let moves: Vec<_> = f
            .journal
            .events_for(EntityId(1))
            .into_iter()
            .filter(|e| matches!(e, HandleEvent::Moved { .. }))
            .collect();
        assert_eq!(
            moves,
            vec![HandleEvent::Moved {
                position: Vec3::new(20.0, 0.0, 0.0),
                heading: 0.0
            }]
        );
        assert_eq!(f.session.registry().position_of(EntityId(1)), Some(Vec3::new(20.0, 0.0, 0.0)));
    }

    #[test]
    fn repeated_deletion_applies_once() {
        let f = fixture();
        f.spawn_active(1, 0.0);
        for _ in 0..5 {
            f.session.request_deletion(EntityId(1));
        }
        let report = f.applied(Instant::now());
        assert_eq!(report.deletions_applied, 1);
        assert!(!f.session.registry().contains(EntityId(1)));
        assert_eq!(
            f.journal.count(EntityId(1), |e| matches!(e, HandleEvent::Hidden)),
            1
        );
    }

    #[test]
    fn out_of_range_move_fades_on_next_tick() {
        let f = fixture();
        f.spawn_active(1, 50.0);
        f.session.enqueue_move(mv(1, 500.0));

        let t0 = Instant::now();
        let first = f.applied(t0);
        assert_eq!(first.moves_faded, 1);
        assert_eq!(first.deletions_applied, 0);
        assert_eq!(f.session.registry().state(EntityId(1)), Some(RecordState::Active));
        assert_eq!(f.session.registry().position_of(EntityId(1)), Some(Vec3::new(50.0, 0.0, 0.0)));
        assert_eq!(
            f.outbound.take(),
            vec![OutboundRequest::SelfLocationBroadcast {
                position: Vec3::ZERO,
                heading: 0.0
            }]
        );

        let second = f.applied(t0 + Duration::from_millis(16));
        assert_eq!(second.deletions_applied, 1);
        assert!(!f.session.registry().contains(EntityId(1)));
        assert_eq!(f.session.scheduled_disposals(), 1);

        let third = f.applied(t0 + Duration::from_millis(600));
        assert_eq!(third.disposed, 1);
        assert_eq!(
            f.journal.count(EntityId(1), |e| matches!(e, HandleEvent::Disposed)),
            1
        );
    }

    #[test]
    fn unknown_entity_in_range_requests_info() {
        let f = fixture();
        f.session.enqueue_move(mv(42, 30.0));
        f.session.enqueue_move(mv(43, 300.0));

        let report = f.applied(Instant::now());
        assert_eq!(report.info_requests, 1);
        assert_eq!(report.moves_dropped, 1);
        assert!(f.session.registry().is_empty());
        assert_eq!(
            f.outbound.take(),
            vec![
                OutboundRequest::ObjectInfoRequest(EntityId(42)),
                OutboundRequest::SelfLocationBroadcast {
                    position: Vec3::ZERO,
                    heading: 0.0
                },
            ]
        );
    }

    #[test]
    fn animation_gated_by_recorded_distance() {
        let f = fixture();
        f.spawn_active(1, 10.0);
        f.spawn_active(2, 90.0);
        // Viewer walks away from entity 2.
        f.viewer.set_transform(Vec3::new(-50.0, 0.0, 0.0), 0.0);
        f.session.enqueue_animation(anim(1));
        f.session.enqueue_animation(anim(2));
        f.session.enqueue_animation(anim(3));

        let report = f.applied(Instant::now());
        assert_eq!(report.animations_applied, 1);
        assert_eq!(report.animations_dropped, 2);
        assert_eq!(
            f.journal.count(EntityId(1), |e| matches!(e, HandleEvent::Animated(_))),
            1
        );
        assert_eq!(
            f.journal.count(EntityId(2), |e| matches!(e, HandleEvent::Animated(_))),
            0
        );
    }

    #[test]
    fn move_for_pending_entity_is_dropped() {
        let f = fixture();
        f.session
            .observe_entity(EntityId(5), CharacterDescriptor::at("npc", Vec3::ZERO, 0.0))
            .unwrap();
        f.session.enqueue_move(mv(5, 3.0));

        let report = f.applied(Instant::now());
        assert_eq!(report.moves_dropped, 1);
        assert!(f.outbound.is_empty());
        assert_eq!(f.session.registry().state(EntityId(5)), Some(RecordState::Pending));
    }

    #[test]
    fn deletion_of_pending_entity_is_noop() {
        let f = fixture();
        f.session
            .observe_entity(EntityId(5), CharacterDescriptor::at("npc", Vec3::ZERO, 0.0))
            .unwrap();
        f.session.request_deletion(EntityId(5));

        let report = f.applied(Instant::now());
        assert_eq!(report.deletions_applied, 0);
        assert_eq!(f.session.registry().state(EntityId(5)), Some(RecordState::Pending));
    }

    #[test]
    fn broken_handle_does_not_abort_tick() {
        let f = fixture();
        let desc = CharacterDescriptor::at("npc", Vec3::ZERO, 0.0);
        f.session.observe_entity(EntityId(1), desc.clone()).unwrap();
        let mut broken = HeadlessHandle::new(EntityId(1), &desc, f.journal.clone());
        broken.break_presentation();
        f.session.materialize_entity(EntityId(1), broken).unwrap();
        f.spawn_active(2, 5.0);

        f.session.enqueue_move(mv(1, 1.0));
        f.session.enqueue_move(mv(2, 6.0));
        let report = f.applied(Instant::now());
        assert_eq!(report.missing_handles, 1);
        assert_eq!(report.moves_applied, 1);
    }

    #[test]
    fn kick_tears_down_on_next_tick() {
        let f = fixture();
        f.spawn_active(1, 0.0);
        f.session.request_kick();

        assert_eq!(f.session.tick(), TickOutcome::Kicked);
        assert!(f.session.registry().is_empty());
        assert_eq!(f.session.tick(), TickOutcome::Skipped);
    }

    #[test]
    fn reaper_runs_when_configured() {
        let outbound = Arc::new(RecordingOutbound::new());
        let session: WorldSession<HeadlessHandle> = WorldSession::new(
            SessionSettings {
                visibility_radius: 100.0,
                disposal_delay: Duration::from_millis(500),
                pending_timeout: Some(Duration::from_secs(2)),
            },
            Arc::new(SharedViewer::new(Vec3::ZERO, 0.0)),
            outbound,
        );
        let t0 = Instant::now();
        session
            .observe_entity_at(EntityId(1), CharacterDescriptor::at("npc", Vec3::ZERO, 0.0), t0)
            .unwrap();

        let TickOutcome::Applied(report) = session.tick_at(t0 + Duration::from_secs(3)) else {
            panic!("tick skipped");
        };
        assert_eq!(report.orphans_reaped, 1);
        assert!(session.registry().is_empty());
    }
}

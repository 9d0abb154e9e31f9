//! Session behavior under concurrent producers, ticks and teardown.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Barrier,
    },
    thread,
    time::Duration,
};

use world_client::{
    outbound::OutboundRequest,
    presentation::{HandleEvent, HeadlessHandle},
    registry::RecordState,
    SyncError, TickOutcome, TickReport,
};
use world_shared::{entity::EntityId, math::Vec3};
use world_tests::{descriptor_at, init_tracing, move_to, Harness};

fn applied(outcome: TickOutcome) -> TickReport {
    match outcome {
        TickOutcome::Applied(report) => report,
        other => panic!("expected applied tick, got {other:?}"),
    }
}

#[test]
fn concurrent_sightings_admit_once() {
    init_tracing();
    let h = Harness::at_origin(100.0);
    let threads = 8;
    let barrier = Barrier::new(threads);
    let admitted = AtomicUsize::new(0);
    let duplicates = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..threads {
            s.spawn(|| {
                barrier.wait();
                match h
                    .session
                    .observe_entity(EntityId(42), descriptor_at(Vec3::new(1.0, 0.0, 1.0)))
                {
                    Ok(()) => admitted.fetch_add(1, Ordering::Relaxed),
                    Err(SyncError::DuplicateAdmission) => duplicates.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("unexpected rejection: {e}"),
                };
            });
        }
    });

    assert_eq!(admitted.load(Ordering::Relaxed), 1);
    assert_eq!(duplicates.load(Ordering::Relaxed), threads - 1);
    assert_eq!(h.session.registry().len(), 1);
    assert_eq!(h.session.pending_creations(), 1);
}

#[test]
fn ticks_only_ever_see_the_newest_move() {
    init_tracing();
    let h = Harness::at_origin(100.0);
    h.spawn_active(1, Vec3::ZERO);
    let last = 4_999;

    thread::scope(|s| {
        let producer = s.spawn(|| {
            for i in 0..=last {
                h.session
                    .enqueue_move(move_to(1, Vec3::new(i as f32 * 0.01, 0.0, 0.0)));
            }
        });
        while !producer.is_finished() {
            h.session.tick();
            thread::yield_now();
        }
    });
    h.session.tick();

    let expected = Vec3::new(last as f32 * 0.01, 0.0, 0.0);
    assert_eq!(h.session.registry().position_of(EntityId(1)), Some(expected));

    // Each tick applies the newest write, so applied positions only grow.
    let applied_x: Vec<f32> = h
        .journal
        .events_for(EntityId(1))
        .into_iter()
        .filter_map(|e| match e {
            HandleEvent::Moved { position, .. } => Some(position.x),
            _ => None,
        })
        .collect();
    assert!(applied_x.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(applied_x.last().copied(), Some(expected.x));
}

#[test]
fn repeated_deletions_apply_once() {
    init_tracing();
    let h = Harness::at_origin(100.0);
    h.spawn_active(5, Vec3::new(2.0, 0.0, 2.0));

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..10 {
                    h.session.request_deletion(EntityId(5));
                }
            });
        }
    });
    assert_eq!(h.session.queues().deletions.len(), 1);

    let report = applied(h.session.tick());
    assert_eq!(report.deletions_applied, 1);
    assert_eq!(report.disposed, 1);
    assert!(!h.session.registry().contains(EntityId(5)));
    assert_eq!(
        h.journal.count(EntityId(5), |e| matches!(e, HandleEvent::Hidden)),
        1
    );
    assert_eq!(
        h.journal.count(EntityId(5), |e| matches!(e, HandleEvent::Disposed)),
        1
    );

    let report = applied(h.session.tick());
    assert_eq!(report.deletions_applied, 0);
}

#[test]
fn teardown_during_traffic_releases_every_handle() {
    init_tracing();
    let h = Harness::at_origin(100.0);
    for id in 1..=20 {
        h.spawn_active(id, Vec3::new(id as f32, 0.0, 0.0));
    }

    thread::scope(|s| {
        s.spawn(|| loop {
            if let TickOutcome::Skipped = h.session.tick() {
                break;
            }
            thread::yield_now();
        });
        for worker in 0..3u64 {
            let h = &h;
            s.spawn(move || {
                for round in 0..2_000u64 {
                    let id = 1 + (round * 3 + worker) % 200;
                    // Every seventh move lands out of range and fades the entity.
                    let x = if round % 7 == 0 { 150.0 } else { (round % 90) as f32 };
                    h.session.enqueue_move(move_to(id, Vec3::new(x, 0.0, 0.0)));
                    let desc = descriptor_at(Vec3::new(x, 0.0, 1.0));
                    if h.session.observe_entity(EntityId(id), desc.clone()).is_ok() {
                        let handle = HeadlessHandle::new(EntityId(id), &desc, h.journal.clone());
                        let _ = h.session.materialize_entity(EntityId(id), handle);
                    }
                    h.session.request_deletion(EntityId(id + 1));
                }
            });
        }
        thread::sleep(Duration::from_millis(20));
        h.session.teardown_all();
    });

    assert!(h.session.is_exiting());
    assert!(h.session.registry().is_empty());
    assert!(h.session.queues().is_empty());
    assert_eq!(h.session.pending_creations(), 0);
    assert_eq!(h.session.scheduled_disposals(), 0);

    for id in 1..=201 {
        let built = h
            .journal
            .count(EntityId(id), |e| matches!(e, HandleEvent::Built { .. }));
        let disposed = h
            .journal
            .count(EntityId(id), |e| matches!(e, HandleEvent::Disposed));
        assert_eq!(built, disposed, "handle leak or double dispose for #{id}");
    }

    // Everything after teardown is a no-op.
    assert_eq!(
        h.session
            .observe_entity(EntityId(900), descriptor_at(Vec3::ZERO)),
        Err(SyncError::SessionClosed)
    );
    assert!(!h.session.enqueue_move(move_to(1, Vec3::ZERO)));
    assert!(!h.session.request_deletion(EntityId(1)));
    assert!(matches!(h.session.tick(), TickOutcome::Skipped));
    assert!(h.session.registry().is_empty());
    assert!(h.session.queues().is_empty());
}

#[test]
fn admission_respects_the_radius() {
    let h = Harness::at_origin(50.0);

    assert_eq!(
        h.session
            .observe_entity(EntityId(1), descriptor_at(Vec3::new(40.0, 0.0, 40.0))),
        Err(SyncError::OutOfRange)
    );
    assert!(!h.session.registry().contains(EntityId(1)));
    assert_eq!(h.session.pending_creations(), 0);

    h.session
        .observe_entity(EntityId(2), descriptor_at(Vec3::new(30.0, 0.0, 40.0)))
        .expect("boundary is inclusive");
    assert_eq!(h.session.registry().state(EntityId(2)), Some(RecordState::Pending));

    let (id, desc) = h.session.drain_creations().remove(0);
    let handle = HeadlessHandle::new(id, &desc, h.journal.clone());
    h.session.materialize_entity(id, handle).expect("pending id");
    assert_eq!(h.session.registry().state(EntityId(2)), Some(RecordState::Active));
}

#[test]
fn out_of_range_move_fades_on_the_following_tick() {
    let h = Harness::at_origin(100.0);
    h.spawn_active(3, Vec3::new(10.0, 0.0, 0.0));

    h.session.enqueue_move(move_to(3, Vec3::new(0.0, 0.0, 120.0)));
    let report = applied(h.session.tick());
    assert_eq!(report.moves_faded, 1);
    assert_eq!(report.deletions_applied, 0);
    assert_eq!(h.session.registry().state(EntityId(3)), Some(RecordState::Active));
    assert_eq!(
        h.session.registry().position_of(EntityId(3)),
        Some(Vec3::new(10.0, 0.0, 0.0))
    );
    assert_eq!(
        h.outbound.take(),
        vec![OutboundRequest::SelfLocationBroadcast {
            position: Vec3::ZERO,
            heading: 0.0,
        }]
    );

    let report = applied(h.session.tick());
    assert_eq!(report.deletions_applied, 1);
    assert!(!h.session.registry().contains(EntityId(3)));
    assert_eq!(
        h.journal.count(EntityId(3), |e| matches!(e, HandleEvent::Hidden)),
        1
    );
}

#[test]
fn unknown_nearby_mover_triggers_info_request() {
    let h = Harness::at_origin(100.0);
    h.viewer.set_transform(Vec3::new(5.0, 0.0, 5.0), 90.0);

    h.session.enqueue_move(move_to(8, Vec3::new(20.0, 0.0, 20.0)));
    let report = applied(h.session.tick());
    assert_eq!(report.info_requests, 1);
    assert!(h.session.registry().is_empty());
    assert_eq!(
        h.outbound.take(),
        vec![
            OutboundRequest::ObjectInfoRequest(EntityId(8)),
            OutboundRequest::SelfLocationBroadcast {
                position: Vec3::new(5.0, 0.0, 5.0),
                heading: 90.0,
            },
        ]
    );
}

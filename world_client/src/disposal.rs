//! Delayed disposal of removed entities.
//!
//! Removed handles are hidden at once but released only after a fixed delay,
//! letting in-flight effects finish. Deadlines use the monotonic clock and are
//! checked by the tick; teardown flushes everything immediately.

use std::time::{Duration, Instant};

use crate::presentation::EntityHandle;

#[derive(Debug)]
pub struct DisposalSchedule<H> {
    delay: Duration,
    entries: Vec<(Instant, H)>,
}

impl<H: EntityHandle> DisposalSchedule<H> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            entries: Vec::new(),
        }
    }

    /// Queues `handle` for disposal at `now + delay`. A delay past the end of
    /// the clock's range makes the handle due at once.
    pub fn schedule(&mut self, handle: H, now: Instant) {
        let deadline = now.checked_add(self.delay).unwrap_or(now);
        self.entries.push((deadline, handle));
    }

    /// Disposes every handle whose deadline has passed. Returns how many.
    pub fn run_due(&mut self, now: Instant) -> usize {
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|(deadline, _)| *deadline <= now);
        self.entries = waiting;
        let count = due.len();
        for (_, handle) in due {
            handle.dispose();
        }
        count
    }

    /// Disposes everything regardless of deadline.
    pub fn flush(&mut self) -> usize {
        let count = self.entries.len();
        for (_, handle) in self.entries.drain(..) {
            handle.dispose();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::{HandleEvent, HeadlessHandle, Journal};
    use world_shared::{
        entity::{CharacterDescriptor, EntityId},
        math::Vec3,
    };

    #[test]
    fn disposes_after_delay_only() {
        let journal = Journal::new();
        let desc = CharacterDescriptor::at("npc", Vec3::ZERO, 0.0);
        let mut schedule = DisposalSchedule::new(Duration::from_millis(500));
        let t0 = Instant::now();

        schedule.schedule(HeadlessHandle::new(EntityId(1), &desc, journal.clone()), t0);
        schedule.schedule(
            HeadlessHandle::new(EntityId(2), &desc, journal.clone()),
            t0 + Duration::from_millis(300),
        );

        assert_eq!(schedule.run_due(t0 + Duration::from_millis(499)), 0);
        assert_eq!(schedule.run_due(t0 + Duration::from_millis(500)), 1);
        assert_eq!(schedule.len(), 1);
        assert_eq!(
            journal.count(EntityId(1), |e| matches!(e, HandleEvent::Disposed)),
            1
        );

        assert_eq!(schedule.flush(), 1);
        assert!(schedule.is_empty());
        assert_eq!(
            journal.count(EntityId(2), |e| matches!(e, HandleEvent::Disposed)),
            1
        );
    }

    #[test]
    fn unrepresentable_delay_disposes_on_next_run() {
        let journal = Journal::new();
        let desc = CharacterDescriptor::at("npc", Vec3::ZERO, 0.0);
        let mut schedule = DisposalSchedule::new(Duration::MAX);
        let t0 = Instant::now();

        schedule.schedule(HeadlessHandle::new(EntityId(4), &desc, journal.clone()), t0);
        assert_eq!(schedule.run_due(t0), 1);
        assert_eq!(
            journal.count(EntityId(4), |e| matches!(e, HandleEvent::Disposed)),
            1
        );
    }
}

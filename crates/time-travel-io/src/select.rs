//! `select` emulation.
//!
//! [`SelectResolver::select`] answers a three-way readiness wait (read,
//! write, exceptional descriptor lists plus an optional timeout) from the
//! shared event store and moves the virtual clock to the instant the call
//! returns.
//!
//! # Resolution
//!
//! 1. The deadline is `now + timeout`, or never.
//! 2. Each category independently finds its earliest scheduled event among
//!    its own descriptors with its own tag. A category with nothing
//!    scheduled by the deadline is "ready" at the deadline with no
//!    descriptors.
//! 3. The call returns at the earliest of the three ready instants. A
//!    never-ending wait with nothing scheduled is an error.
//! 4. Categories ready at that instant return all of their descriptors;
//!    later categories return nothing.
//! 5. Returned events are consumed and the clock is set.
//!
//! Events scheduled before the current time are overdue. A category with
//! overdue events is ready at the current time and returns every overdue
//! descriptor at once; the clock never moves backwards during resolution.

use std::collections::BTreeSet;

use serde::Serialize;
use time_travel_core::{EventBatch, EventStore, SharedClock, SharedEventStore};
use time_travel_types::{Deadline, Descriptor, IoEvent, SelectEvent, Timestamp};
use tracing::debug;

use crate::error::ResolveError;
use crate::timeline::{Consumed, Timeline};

/// Descriptors reported ready by one `select` call.
///
/// Order within each list follows descriptor order; callers should treat
/// each list as a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectReady<D> {
    /// Descriptors ready for reading.
    pub read: Vec<D>,
    /// Descriptors ready for writing.
    pub write: Vec<D>,
    /// Descriptors with an exceptional condition.
    pub exceptional: Vec<D>,
}

impl<D> SelectReady<D> {
    /// Return whether no descriptor is ready (the call timed out).
    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty() && self.exceptional.is_empty()
    }

    /// Return the list for one category.
    pub fn get(&self, event: SelectEvent) -> &[D] {
        match event {
            SelectEvent::Read => &self.read,
            SelectEvent::Write => &self.write,
            SelectEvent::Exceptional => &self.exceptional,
        }
    }

    fn slot_mut(&mut self, event: SelectEvent) -> &mut Vec<D> {
        match event {
            SelectEvent::Read => &mut self.read,
            SelectEvent::Write => &mut self.write,
            SelectEvent::Exceptional => &mut self.exceptional,
        }
    }

    /// Split into `(read, write, exceptional)`.
    pub fn into_tuple(self) -> (Vec<D>, Vec<D>, Vec<D>) {
        (self.read, self.write, self.exceptional)
    }
}

impl<D> Default for SelectReady<D> {
    fn default() -> Self {
        Self {
            read: Vec::new(),
            write: Vec::new(),
            exceptional: Vec::new(),
        }
    }
}

/// The earliest readiness of one category.
struct CategoryReady<D> {
    event: SelectEvent,
    ready_at: Deadline,
    batches: Vec<EventBatch<D, IoEvent>>,
}

/// Resolves `select` calls against a shared clock and event store.
#[derive(Debug)]
pub struct SelectResolver<D> {
    timeline: Timeline<D>,
}

impl<D> Clone for SelectResolver<D> {
    fn clone(&self) -> Self {
        Self {
            timeline: self.timeline.clone(),
        }
    }
}

impl<D: Descriptor> SelectResolver<D> {
    /// Create a resolver reading and consuming `events` and driving `clock`.
    ///
    /// The store should be registered as a listener on the clock so that
    /// missed events are pruned as time moves.
    pub const fn new(clock: SharedClock, events: SharedEventStore<D, IoEvent>) -> Self {
        Self {
            timeline: Timeline::new(clock, events),
        }
    }

    /// Wait until a descriptor is ready or `timeout` seconds pass.
    ///
    /// A descriptor may appear in several lists and be returned in each
    /// category it has an event for.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::WouldBlockForever`] if `timeout` is `None` and no
    ///   matching event is scheduled.
    /// - [`ResolveError::InvalidTimeout`] if `timeout` is negative or NaN.
    /// - [`ResolveError::StoreBusy`] / [`ResolveError::ClockBusy`] if
    ///   called re-entrantly from a clock listener.
    pub fn select(
        &self,
        read: &[D],
        write: &[D],
        exceptional: &[D],
        timeout: Option<f64>,
    ) -> Result<SelectReady<D>, ResolveError> {
        if let Some(value) = timeout.filter(|value| value.is_nan() || *value < 0.0) {
            return Err(ResolveError::InvalidTimeout { value });
        }

        let now = self.timeline.now()?;
        let deadline = Deadline::after(now, timeout)?;

        let categories = {
            let events = self.timeline.events()?;
            [
                (SelectEvent::Read, read),
                (SelectEvent::Write, write),
                (SelectEvent::Exceptional, exceptional),
            ]
            .map(|(event, waited)| earliest_for(&events, event, waited, now, deadline))
        };

        let resolution = categories
            .iter()
            .fold(deadline, |earliest, category| earliest.min(category.ready_at));
        let Deadline::At(resolved_at) = resolution else {
            return Err(ResolveError::WouldBlockForever);
        };

        let mut ready = SelectReady::default();
        let mut consumed: Vec<Consumed<D>> = Vec::new();
        for category in categories {
            if category.ready_at != resolution {
                continue;
            }
            let mut descriptors: BTreeSet<D> = BTreeSet::new();
            for batch in category.batches {
                descriptors.extend(batch.descriptors());
                consumed.push((batch.timestamp, batch.pairs()));
            }
            *ready.slot_mut(category.event) = descriptors.into_iter().collect();
        }

        self.timeline.commit(consumed, resolved_at)?;

        debug!(
            %now,
            %deadline,
            %resolved_at,
            read = ready.read.len(),
            write = ready.write.len(),
            exceptional = ready.exceptional.len(),
            "select resolved"
        );
        Ok(ready)
    }
}

/// Find when one category becomes ready, no later than `deadline`.
fn earliest_for<D: Descriptor>(
    events: &EventStore<D, IoEvent>,
    event: SelectEvent,
    waited: &[D],
    now: Timestamp,
    deadline: Deadline,
) -> CategoryReady<D> {
    if waited.is_empty() {
        return CategoryReady {
            event,
            ready_at: deadline,
            batches: Vec::new(),
        };
    }

    let waited: BTreeSet<&D> = waited.iter().collect();
    let tag = IoEvent::Select(event);
    let batches = events.due_matches(now, deadline, |descriptor, candidate| {
        *candidate == tag && waited.contains(descriptor)
    });
    let ready_at = batches
        .first()
        .map_or(deadline, |batch| Deadline::At(batch.timestamp.max(now)));
    CategoryReady {
        event,
        ready_at,
        batches,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use time_travel_core::{EventStore, VirtualClock};
    use time_travel_types::Fd;

    use super::*;

    fn ts(secs: f64) -> Timestamp {
        Timestamp::new(secs).unwrap()
    }

    /// Clock at zero with the store registered as its listener.
    fn setup() -> (SharedClock, SharedEventStore<Fd, IoEvent>, SelectResolver<Fd>) {
        let clock = VirtualClock::new(Timestamp::UNIX_EPOCH).into_shared();
        let events: SharedEventStore<Fd, IoEvent> = EventStore::new().into_shared();
        clock.borrow_mut().register_listener(events.clone());
        let resolver = SelectResolver::new(clock.clone(), events.clone());
        (clock, events, resolver)
    }

    fn schedule(events: &SharedEventStore<Fd, IoEvent>, at: f64, fd: i32, event: SelectEvent) {
        events.borrow_mut().add_event(ts(at), Fd(fd), event.into());
    }

    #[test]
    fn single_read_event_resolves_at_its_time() {
        let (clock, events, select) = setup();
        schedule(&events, 2.0, 1, SelectEvent::Read);

        let ready = select.select(&[Fd(1)], &[], &[], Some(17.0)).unwrap();

        assert_eq!(ready.into_tuple(), (vec![Fd(1)], vec![], vec![]));
        assert_eq!(clock.borrow().time(), ts(2.0));
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn empty_lists_wait_for_the_timeout() {
        let (clock, _events, select) = setup();
        let ready = select.select(&[], &[], &[], Some(17.0)).unwrap();
        assert!(ready.is_empty());
        assert_eq!(clock.borrow().time(), ts(17.0));
    }

    #[test]
    fn infinite_wait_with_nothing_scheduled_fails() {
        let (clock, events, select) = setup();
        schedule(&events, 3.0, 2, SelectEvent::Read);

        let err = select.select(&[Fd(1)], &[], &[], None).unwrap_err();

        assert_eq!(err, ResolveError::WouldBlockForever);
        assert_eq!(clock.borrow().time(), Timestamp::UNIX_EPOCH);
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let (_clock, _events, select) = setup();
        assert!(matches!(
            select.select(&[], &[], &[], Some(-1.0)),
            Err(ResolveError::InvalidTimeout { .. })
        ));
    }

    #[test]
    fn event_after_deadline_is_not_returned() {
        let (clock, events, select) = setup();
        schedule(&events, 10.0, 7, SelectEvent::Read);

        let ready = select.select(&[Fd(7)], &[], &[], Some(5.0)).unwrap();

        assert!(ready.is_empty());
        assert_eq!(clock.borrow().time(), ts(5.0));
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn event_exactly_at_deadline_is_returned() {
        let (clock, events, select) = setup();
        schedule(&events, 5.0, 7, SelectEvent::Write);

        let ready = select.select(&[], &[Fd(7)], &[], Some(5.0)).unwrap();

        assert_eq!(ready.write, vec![Fd(7)]);
        assert_eq!(clock.borrow().time(), ts(5.0));
    }

    #[test]
    fn earliest_category_wins_and_later_ones_stay_scheduled() {
        let (clock, events, select) = setup();
        schedule(&events, 4.0, 1, SelectEvent::Read);
        schedule(&events, 2.0, 2, SelectEvent::Write);

        let ready = select.select(&[Fd(1)], &[Fd(2)], &[], None).unwrap();

        assert_eq!(ready.into_tuple(), (vec![], vec![Fd(2)], vec![]));
        assert_eq!(clock.borrow().time(), ts(2.0));
        assert!(events.borrow().contains(ts(4.0), &Fd(1), &SelectEvent::Read.into()));
    }

    #[test]
    fn all_descriptors_ready_at_the_same_instant_are_returned() {
        let (_clock, events, select) = setup();
        schedule(&events, 3.0, 1, SelectEvent::Read);
        schedule(&events, 3.0, 2, SelectEvent::Read);
        schedule(&events, 3.0, 3, SelectEvent::Write);
        schedule(&events, 5.0, 4, SelectEvent::Read);

        let ready = select
            .select(&[Fd(1), Fd(2), Fd(4)], &[Fd(3)], &[], None)
            .unwrap();

        assert_eq!(ready.read, vec![Fd(1), Fd(2)]);
        assert_eq!(ready.write, vec![Fd(3)]);
    }

    #[test]
    fn same_descriptor_in_several_categories() {
        let (_clock, events, select) = setup();
        schedule(&events, 1.0, 9, SelectEvent::Read);
        schedule(&events, 1.0, 9, SelectEvent::Exceptional);

        let ready = select
            .select(&[Fd(9)], &[Fd(9)], &[Fd(9)], Some(3.0))
            .unwrap();

        assert_eq!(ready.into_tuple(), (vec![Fd(9)], vec![], vec![Fd(9)]));
    }

    #[test]
    fn wrong_tag_or_unwaited_descriptor_is_ignored() {
        let (clock, events, select) = setup();
        schedule(&events, 1.0, 1, SelectEvent::Write);
        schedule(&events, 2.0, 2, SelectEvent::Read);
        schedule(&events, 3.0, 1, SelectEvent::Read);

        let ready = select.select(&[Fd(1)], &[], &[], None).unwrap();

        assert_eq!(ready.read, vec![Fd(1)]);
        assert_eq!(clock.borrow().time(), ts(3.0));
    }

    #[test]
    fn consumed_event_is_not_returned_twice() {
        let (clock, events, select) = setup();
        schedule(&events, 3.0, 4, SelectEvent::Exceptional);

        let first = select.select(&[], &[], &[Fd(4)], Some(6.0)).unwrap();
        assert_eq!(first.exceptional, vec![Fd(4)]);
        assert_eq!(clock.borrow().time(), ts(3.0));

        let second = select.select(&[], &[], &[Fd(4)], Some(6.0)).unwrap();
        assert!(second.is_empty());
        assert_eq!(clock.borrow().time(), ts(9.0));
    }

    #[test]
    fn past_event_resolves_without_moving_clock_backwards() {
        let (clock, events, select) = setup();
        clock.borrow_mut().set_time(ts(50.0)).unwrap();
        schedule(&events, 10.0, 1, SelectEvent::Read);

        let ready = select.select(&[Fd(1)], &[], &[], None).unwrap();

        assert_eq!(ready.read, vec![Fd(1)]);
        assert_eq!(clock.borrow().time(), ts(50.0));
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn all_overdue_events_are_delivered_together() {
        let (clock, events, select) = setup();
        clock.borrow_mut().set_time(ts(100.0)).unwrap();
        schedule(&events, 50.0, 1, SelectEvent::Read);
        schedule(&events, 80.0, 1, SelectEvent::Read);
        schedule(&events, 80.0, 2, SelectEvent::Read);
        schedule(&events, 90.0, 3, SelectEvent::Write);
        schedule(&events, 130.0, 1, SelectEvent::Read);

        let ready = select.select(&[Fd(1), Fd(2)], &[Fd(3)], &[], None).unwrap();

        assert_eq!(ready.into_tuple(), (vec![Fd(1), Fd(2)], vec![Fd(3)], vec![]));
        assert_eq!(clock.borrow().time(), ts(100.0));
        assert_eq!(events.borrow().len(), 1);

        let next = select.select(&[Fd(1)], &[], &[], None).unwrap();
        assert_eq!(next.read, vec![Fd(1)]);
        assert_eq!(clock.borrow().time(), ts(130.0));
    }

    #[test]
    fn overdue_events_of_unwaited_categories_are_still_pruned() {
        let (clock, events, select) = setup();
        clock.borrow_mut().set_time(ts(100.0)).unwrap();
        schedule(&events, 50.0, 1, SelectEvent::Read);
        schedule(&events, 60.0, 1, SelectEvent::Write);

        let ready = select.select(&[Fd(1)], &[], &[], Some(1.0)).unwrap();

        assert_eq!(ready.read, vec![Fd(1)]);
        assert_eq!(clock.borrow().time(), ts(100.0));
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn busy_store_is_reported() {
        let (_clock, events, select) = setup();
        let _held = events.borrow_mut();
        assert_eq!(
            select.select(&[], &[], &[], Some(1.0)).unwrap_err(),
            ResolveError::StoreBusy
        );
    }

    #[test]
    fn ready_sets_serialize_by_category() {
        let (_clock, events, select) = setup();
        schedule(&events, 1.0, 2, SelectEvent::Write);

        let ready = select.select(&[Fd(2)], &[Fd(2)], &[], None).unwrap();
        let json = serde_json::to_value(&ready).unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "read": [], "write": [2], "exceptional": [] })
        );
    }
}

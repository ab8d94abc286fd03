//! The [`TimeTravel`] context.
//!
//! One context owns one virtual timeline: a [`VirtualClock`], the
//! [`EventStore`] of scheduled readiness events, and a [`CalendarClock`]
//! projection. The store and the calendar are registered as clock
//! listeners in that order, so by the time the calendar sees a new time the
//! store has already discarded the events it passed.
//!
//! Resolvers handed out by the context share its clock and store. Each
//! poll resolver has its own registry.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, NaiveDate, Utc};
use time_travel_core::{
    CalendarClock, DEFAULT_START_TIME, EventStore, SharedClock, SharedEventStore, TimeTravelConfig,
    VirtualClock,
};
use time_travel_io::{EpollResolver, PollResolver, SelectResolver};
use time_travel_types::{Descriptor, IoEvent, PollFlags, Timestamp};
use tracing::debug;

use crate::error::TravelError;

/// Shared handle to the calendar projection.
pub type SharedCalendar = Rc<RefCell<CalendarClock>>;

/// A virtual timeline for one test.
///
/// `D` is the descriptor type events are scheduled against, typically
/// [`Fd`](time_travel_types::Fd) or
/// [`HandleId`](time_travel_types::HandleId).
#[derive(Debug)]
pub struct TimeTravel<D> {
    clock: SharedClock,
    events: SharedEventStore<D, IoEvent>,
    calendar: SharedCalendar,
    default_interest: PollFlags,
}

impl<D: Descriptor> TimeTravel<D> {
    /// Create a timeline starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`TravelError::Clock`] if `start` is before
    /// [`DEFAULT_START_TIME`], or [`TravelError::Calendar`] if it is outside
    /// the range the calendar projection supports.
    pub fn new(start: Timestamp) -> Result<Self, TravelError> {
        let clock = VirtualClock::starting_at(start)?;
        let calendar = CalendarClock::new(start)?;
        Ok(Self::assemble(clock, calendar, PollFlags::DEFAULT_INTEREST))
    }

    /// Create a timeline from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TravelError::Config`] if the configuration is invalid, and
    /// [`TravelError::Clock`] or [`TravelError::Calendar`] if the start
    /// time cannot be used.
    pub fn from_config(config: &TimeTravelConfig) -> Result<Self, TravelError> {
        config.validate()?;
        let clock = VirtualClock::from_config(&config.clock)?;
        let calendar = CalendarClock::new(clock.time())?;
        let default_interest = config.poll.interest_mask()?;
        Ok(Self::assemble(clock, calendar, default_interest))
    }

    fn assemble(clock: VirtualClock, calendar: CalendarClock, default_interest: PollFlags) -> Self {
        let start = clock.time();
        let clock = clock.into_shared();
        let events: SharedEventStore<D, IoEvent> =
            EventStore::new().with_now(start).into_shared();
        let calendar = Rc::new(RefCell::new(calendar));
        {
            let mut clock = clock.borrow_mut();
            clock.register_listener(events.clone());
            clock.register_listener(calendar.clone());
        }
        debug!(%start, ?default_interest, "Timeline created");
        Self {
            clock,
            events,
            calendar,
            default_interest,
        }
    }

    /// Return the current virtual time (`time.time()`).
    pub fn time(&self) -> Result<Timestamp, TravelError> {
        Ok(self.borrow_clock()?.time())
    }

    /// Jump the clock to `new_time`, forwards or backwards.
    pub fn set_time(&self, new_time: Timestamp) -> Result<(), TravelError> {
        self.borrow_clock_mut()?.set_time(new_time)?;
        Ok(())
    }

    /// Advance the clock by `seconds` (`time.sleep`). Returns the new time.
    ///
    /// # Errors
    ///
    /// Returns [`TravelError::Clock`] for negative or non-finite durations.
    pub fn sleep(&self, seconds: f64) -> Result<Timestamp, TravelError> {
        Ok(self.borrow_clock_mut()?.advance(seconds)?)
    }

    /// Return the current virtual date-time (`datetime.now()`).
    pub fn now(&self) -> Result<DateTime<Utc>, TravelError> {
        Ok(self.borrow_calendar()?.now())
    }

    /// Return the current virtual date (`date.today()`).
    pub fn today(&self) -> Result<NaiveDate, TravelError> {
        Ok(self.borrow_calendar()?.today())
    }

    /// Schedule `tag` for `descriptor` at `time_from_now` seconds after
    /// the current virtual time. Returns the absolute timestamp used.
    ///
    /// A negative offset schedules an event in the past, which is
    /// delivered by the next call waiting on it.
    ///
    /// # Errors
    ///
    /// Returns [`TravelError::Time`] if the resulting timestamp is not on
    /// the timeline.
    pub fn add_future_event(
        &self,
        time_from_now: f64,
        descriptor: D,
        tag: impl Into<IoEvent>,
    ) -> Result<Timestamp, TravelError> {
        let timestamp = self.time()?.checked_add(time_from_now)?;
        self.add_event_at(timestamp, descriptor, tag)?;
        Ok(timestamp)
    }

    /// Schedule `tag` for `descriptor` at an absolute timestamp.
    pub fn add_event_at(
        &self,
        timestamp: Timestamp,
        descriptor: D,
        tag: impl Into<IoEvent>,
    ) -> Result<(), TravelError> {
        let tag = tag.into();
        let mut events = self
            .events
            .try_borrow_mut()
            .map_err(|_err| TravelError::Busy {
                resource: "event store",
            })?;
        debug!(%timestamp, ?descriptor, ?tag, "Event scheduled");
        events.add_event(timestamp, descriptor, tag);
        Ok(())
    }

    /// Return the number of scheduled events not yet consumed or passed.
    pub fn pending_events(&self) -> Result<usize, TravelError> {
        self.events
            .try_borrow()
            .map(|events| events.len())
            .map_err(|_err| TravelError::Busy {
                resource: "event store",
            })
    }

    /// Create a `select` resolver on this timeline.
    pub fn select_resolver(&self) -> SelectResolver<D> {
        SelectResolver::new(self.clock.clone(), self.events.clone())
    }

    /// Create a `poll` resolver on this timeline with an empty registry.
    pub fn poll_resolver(&self) -> PollResolver<D> {
        PollResolver::new(self.clock.clone(), self.events.clone())
            .with_default_interest(self.default_interest)
    }

    /// Create an `epoll` resolver on this timeline with an empty registry.
    pub fn epoll_resolver(&self) -> EpollResolver<D> {
        self.poll_resolver()
    }

    /// Return the mask poll resolvers register descriptors with by default.
    pub const fn default_interest(&self) -> PollFlags {
        self.default_interest
    }

    /// Return a handle to the clock.
    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    /// Return a handle to the event store.
    pub fn events(&self) -> SharedEventStore<D, IoEvent> {
        self.events.clone()
    }

    /// Return a handle to the calendar projection.
    pub fn calendar(&self) -> SharedCalendar {
        self.calendar.clone()
    }

    fn borrow_clock(&self) -> Result<std::cell::Ref<'_, VirtualClock>, TravelError> {
        self.clock
            .try_borrow()
            .map_err(|_err| TravelError::Busy { resource: "clock" })
    }

    fn borrow_clock_mut(&self) -> Result<std::cell::RefMut<'_, VirtualClock>, TravelError> {
        self.clock
            .try_borrow_mut()
            .map_err(|_err| TravelError::Busy { resource: "clock" })
    }

    fn borrow_calendar(&self) -> Result<std::cell::Ref<'_, CalendarClock>, TravelError> {
        self.calendar
            .try_borrow()
            .map_err(|_err| TravelError::Busy {
                resource: "calendar",
            })
    }
}

impl<D: Descriptor> Default for TimeTravel<D> {
    /// A timeline starting at [`DEFAULT_START_TIME`].
    fn default() -> Self {
        let start = Timestamp::new(DEFAULT_START_TIME).unwrap_or_default();
        let calendar = CalendarClock::new(start).unwrap_or_default();
        Self::assemble(
            VirtualClock::new(start),
            calendar,
            PollFlags::DEFAULT_INTEREST,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Datelike, Timelike};
    use time_travel_core::{ClockError, ClockListener, ListenerError};
    use time_travel_types::{Fd, SelectEvent, TimeError};

    use super::*;

    fn ts(secs: f64) -> Timestamp {
        Timestamp::new(secs).unwrap()
    }

    #[test]
    fn default_starts_one_day_after_epoch() {
        let travel: TimeTravel<Fd> = TimeTravel::default();
        assert_eq!(travel.time().unwrap(), ts(DEFAULT_START_TIME));
        assert_eq!(
            travel.today().unwrap(),
            NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()
        );
        assert_eq!(travel.clock().borrow().listener_count(), 2);
    }

    #[test]
    fn sleep_moves_clock_and_calendar() {
        let travel: TimeTravel<Fd> = TimeTravel::default();
        let after = travel.sleep(90.0 * 60.0).unwrap();
        assert_eq!(after, ts(DEFAULT_START_TIME + 5400.0));
        assert_eq!(travel.time().unwrap(), after);
        assert_eq!(travel.now().unwrap().hour(), 1);
        assert_eq!(travel.now().unwrap().minute(), 30);
    }

    #[test]
    fn sleep_rejects_negative_durations() {
        let travel: TimeTravel<Fd> = TimeTravel::default();
        assert!(matches!(
            travel.sleep(-1.0),
            Err(TravelError::Clock {
                source: ClockError::InvalidDuration { .. }
            })
        ));
        assert_eq!(travel.time().unwrap(), ts(DEFAULT_START_TIME));
    }

    #[test]
    fn set_time_can_go_backwards() {
        let travel: TimeTravel<Fd> = TimeTravel::new(ts(100_000.0)).unwrap();
        travel.set_time(ts(50.0)).unwrap();
        assert_eq!(travel.time().unwrap(), ts(50.0));
        assert_eq!(travel.today().unwrap().day(), 1);
    }

    #[test]
    fn future_events_are_relative_to_now() {
        let travel: TimeTravel<Fd> = TimeTravel::default();
        travel.sleep(10.0).unwrap();
        let at = travel
            .add_future_event(5.0, Fd(3), SelectEvent::Read)
            .unwrap();
        assert_eq!(at, ts(DEFAULT_START_TIME + 15.0));
        assert!(travel.events().borrow().contains(
            at,
            &Fd(3),
            &IoEvent::Select(SelectEvent::Read)
        ));
        assert_eq!(travel.pending_events().unwrap(), 1);
    }

    #[test]
    fn future_event_before_epoch_is_rejected() {
        let travel: TimeTravel<Fd> = TimeTravel::default();
        assert!(matches!(
            travel.add_future_event(-(DEFAULT_START_TIME + 1.0), Fd(1), SelectEvent::Read),
            Err(TravelError::Time {
                source: TimeError::Negative { .. }
            })
        ));
        assert_eq!(travel.pending_events().unwrap(), 0);
    }

    #[test]
    fn passing_time_prunes_missed_events() {
        let travel: TimeTravel<Fd> = TimeTravel::default();
        travel
            .add_future_event(5.0, Fd(1), PollFlags::POLLIN)
            .unwrap();
        travel
            .add_future_event(20.0, Fd(1), PollFlags::POLLIN)
            .unwrap();
        travel.sleep(10.0).unwrap();
        assert_eq!(travel.pending_events().unwrap(), 1);
    }

    #[test]
    fn from_config_uses_start_time_and_interest() {
        let config = TimeTravelConfig::parse(
            "clock:\n  start_time: 172800.0\npoll:\n  default_interest: [pollin]\n",
        )
        .unwrap();
        let travel: TimeTravel<Fd> = TimeTravel::from_config(&config).unwrap();
        assert_eq!(travel.time().unwrap(), ts(172_800.0));
        assert_eq!(travel.default_interest(), PollFlags::POLLIN);

        let mut poller = travel.epoll_resolver();
        poller.register(Fd(1), None);
        assert_eq!(poller.registered(&Fd(1)), Some(PollFlags::POLLIN));
    }

    #[test]
    fn start_before_minimum_is_rejected() {
        assert!(matches!(
            TimeTravel::<Fd>::new(ts(1.0)),
            Err(TravelError::Clock {
                source: ClockError::BeforeMinimum { .. }
            })
        ));

        let config = TimeTravelConfig {
            clock: time_travel_core::ClockConfig { start_time: 0.0 },
            ..TimeTravelConfig::default()
        };
        assert!(matches!(
            TimeTravel::<Fd>::from_config(&config),
            Err(TravelError::Config { .. })
        ));

        let floor: TimeTravel<Fd> = TimeTravel::new(ts(DEFAULT_START_TIME)).unwrap();
        assert_eq!(floor.time().unwrap(), ts(86_400.0));
    }

    #[test]
    fn store_knows_the_start_before_the_clock_moves() {
        let travel: TimeTravel<Fd> = TimeTravel::new(ts(100_000.0)).unwrap();
        assert_eq!(travel.events().borrow().now(), Some(ts(100_000.0)));

        let at = travel
            .add_future_event(-30.0, Fd(2), SelectEvent::Read)
            .unwrap();
        assert_eq!(at, ts(99_970.0));

        let ready = travel
            .select_resolver()
            .select(&[Fd(2)], &[], &[], None)
            .unwrap();
        assert_eq!(ready.read, vec![Fd(2)]);
        assert_eq!(travel.time().unwrap(), ts(100_000.0));
        assert_eq!(travel.pending_events().unwrap(), 0);
    }

    #[test]
    fn out_of_range_start_is_rejected() {
        assert!(matches!(
            TimeTravel::<Fd>::new(ts(1e300)),
            Err(TravelError::Calendar {
                source: ListenerError::OutOfRange { .. }
            })
        ));
    }

    struct Reentrant {
        travel: Rc<TimeTravel<Fd>>,
        observed: Option<bool>,
    }

    impl ClockListener for Reentrant {
        fn on_time_changed(&mut self, _new_time: Timestamp) -> Result<(), ListenerError> {
            self.observed = Some(matches!(
                self.travel.time(),
                Err(TravelError::Busy { resource: "clock" })
            ));
            Ok(())
        }
    }

    #[test]
    fn reentrant_use_reports_busy() {
        let travel: Rc<TimeTravel<Fd>> = Rc::new(TimeTravel::default());
        let listener = Rc::new(RefCell::new(Reentrant {
            travel: Rc::clone(&travel),
            observed: None,
        }));
        travel
            .clock()
            .borrow_mut()
            .register_listener(listener.clone());

        travel.sleep(1.0).unwrap();
        assert_eq!(listener.borrow().observed, Some(true));
    }
}

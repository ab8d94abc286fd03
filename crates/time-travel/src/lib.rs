//! Deterministic virtual time and I/O readiness for tests.
//!
//! Code under test that calls `time`, `sleep`, `select` or `poll` can be
//! pointed at a [`TimeTravel`] timeline instead of the operating system.
//! Tests schedule readiness events ahead of time, and every emulated
//! blocking call resolves instantly: the clock jumps straight to the
//! moment the call would have returned.
//!
//! ```
//! use time_travel::{Fd, SelectEvent, TimeTravel};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let travel: TimeTravel<Fd> = TimeTravel::default();
//! let start = travel.time()?;
//!
//! travel.add_future_event(120.0, Fd(4), SelectEvent::Read)?;
//! let ready = travel
//!     .select_resolver()
//!     .select(&[Fd(4)], &[], &[], Some(3000.0))?;
//!
//! assert_eq!(ready.read, vec![Fd(4)]);
//! assert_eq!(travel.time()?.seconds_since(start), 120.0);
//! # Ok(())
//! # }
//! ```
//!
//! The building blocks live in their own crates and are re-exported here:
//! value types from `time-travel-types`, the clock, event store and
//! configuration from `time-travel-core`, and the resolvers from
//! `time-travel-io`.

pub mod error;
pub mod travel;

pub use error::TravelError;
pub use travel::{SharedCalendar, TimeTravel};

pub use time_travel_core::{
    CalendarClock, ClockConfig, ClockError, ClockListener, ConfigError, DEFAULT_START_TIME,
    EventBatch, EventStore, EventStoreError, ListenerError, LoggingConfig, PollConfig,
    SharedClock, SharedEventStore, SharedListener, TimeTravelConfig, VirtualClock,
};
pub use time_travel_io::{EpollResolver, PollResolver, ResolveError, SelectReady, SelectResolver};
pub use time_travel_types::{
    Deadline, Descriptor, Fd, HandleId, IoEvent, PollFlags, PollerId, SelectEvent, TimeError,
    Timestamp,
};

//! Calendar projection of the virtual clock.
//!
//! [`CalendarClock`] listens to the virtual clock and keeps the current
//! virtual instant as a [`chrono::DateTime<Utc>`], so code under test that
//! asks "what day is it" sees the same timeline as code that asks "what
//! time is it". Projection is always in UTC; local time zones would make
//! results depend on the machine running the test.

use chrono::{DateTime, NaiveDate, Utc};
use time_travel_types::Timestamp;

use crate::clock::{ClockListener, ListenerError};

/// Nanoseconds per second.
const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Clock listener that tracks the virtual time as a calendar date-time.
///
/// The default projection is the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalendarClock {
    /// The projected current instant.
    now: DateTime<Utc>,
}

impl CalendarClock {
    /// Create a projection starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::OutOfRange`] if `start` cannot be expressed
    /// as a `chrono` date-time.
    pub fn new(start: Timestamp) -> Result<Self, ListenerError> {
        Ok(Self {
            now: to_datetime(start)?,
        })
    }

    /// Return the current virtual date-time (`datetime.now()`).
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Return the current virtual date (`date.today()`).
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

impl ClockListener for CalendarClock {
    fn on_time_changed(&mut self, new_time: Timestamp) -> Result<(), ListenerError> {
        self.now = to_datetime(new_time)?;
        Ok(())
    }
}

/// Convert a virtual timestamp into a UTC date-time, rounded to the
/// nearest nanosecond.
///
/// # Errors
///
/// Returns [`ListenerError::OutOfRange`] if the timestamp is beyond what
/// `chrono` can represent.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_datetime(timestamp: Timestamp) -> Result<DateTime<Utc>, ListenerError> {
    let secs = timestamp.as_secs_f64();
    let mut whole = secs.trunc();
    let mut nanos = ((secs - whole) * NANOS_PER_SECOND).round();
    if nanos >= NANOS_PER_SECOND {
        whole += 1.0;
        nanos = 0.0;
    }
    // Both values are non-negative (timestamps are validated) and nanos is
    // below one billion; `as` saturates out-of-range seconds, which chrono
    // then rejects.
    DateTime::from_timestamp(whole as i64, nanos as u32)
        .ok_or(ListenerError::OutOfRange { timestamp })
}

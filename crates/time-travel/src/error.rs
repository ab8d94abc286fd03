//! Error types for the `time-travel` facade.

use time_travel_core::{ClockError, ConfigError, ListenerError};
use time_travel_types::TimeError;

/// Errors returned by [`TimeTravel`](crate::TimeTravel) operations.
///
/// Resolver calls return
/// [`ResolveError`](time_travel_io::ResolveError) directly.
#[derive(Debug, thiserror::Error)]
pub enum TravelError {
    /// The configuration could not be loaded or is invalid.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// Moving the clock failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// A timestamp or offset was not usable.
    #[error("time error: {source}")]
    Time {
        /// The underlying time error.
        #[from]
        source: TimeError,
    },

    /// The calendar projection rejected the starting time.
    #[error("calendar error: {source}")]
    Calendar {
        /// The underlying listener error.
        #[from]
        source: ListenerError,
    },

    /// A shared handle is already mutably borrowed, which happens when the
    /// facade is used from inside a clock listener.
    #[error("{resource} is busy")]
    Busy {
        /// Which handle was busy (`"clock"`, `"event store"`, `"calendar"`).
        resource: &'static str,
    },
}

//! Error types for the `time-travel-io` crate.
//!
//! All resolver operations return [`ResolveError`]. The two failures a
//! test author is expected to meet are [`ResolveError::WouldBlockForever`]
//! (an unbounded wait with nothing scheduled) and
//! [`ResolveError::UnknownDescriptor`] (modifying or unregistering a
//! descriptor a poller never saw). The remaining variants signal misuse or
//! an internal desynchronization and should fail the test.

use time_travel_core::{ClockError, EventStoreError};
use time_travel_types::TimeError;

/// Errors that can occur while resolving a blocking call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    /// The call has no timeout and no matching event is scheduled, so it
    /// would block forever.
    #[error("no relevant future events were scheduled for an infinite timeout")]
    WouldBlockForever,

    /// The descriptor is not registered with this poller.
    #[error("descriptor {descriptor} is not registered")]
    UnknownDescriptor {
        /// Debug rendering of the descriptor.
        descriptor: String,
    },

    /// The timeout is negative or NaN.
    #[error("invalid timeout: {value}")]
    InvalidTimeout {
        /// The rejected timeout in seconds.
        value: f64,
    },

    /// The event store and the resolver disagree about scheduled events.
    #[error("event store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: EventStoreError,
    },

    /// Advancing the clock failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// A deadline could not be computed.
    #[error("time error: {source}")]
    Time {
        /// The underlying time error.
        #[from]
        source: TimeError,
    },

    /// The event store is already borrowed (a resolver was called from
    /// inside a clock listener).
    #[error("event store is busy")]
    StoreBusy,

    /// The clock is already borrowed (a resolver was called from inside a
    /// clock listener).
    #[error("clock is busy")]
    ClockBusy,
}

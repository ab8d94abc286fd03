//! Virtual clock, scheduled event store, and configuration for the
//! time-travel test harness.
//!
//! Nothing in this crate blocks or reads a real clock. "Waiting" is a
//! lookup in the [`EventStore`] followed by a jump of the
//! [`VirtualClock`].
//!
//! # Modules
//!
//! - [`clock`] -- [`VirtualClock`] and the [`ClockListener`] protocol.
//! - [`event_store`] -- [`EventStore`]: scheduled `(timestamp, descriptor,
//!   tag)` triples with filtered earliest-match queries and pruning.
//! - [`calendar`] -- [`CalendarClock`], a listener projecting virtual time
//!   into `chrono` date-times.
//! - [`config`] -- YAML configuration with environment overrides.

pub mod calendar;
pub mod clock;
pub mod config;
pub mod event_store;

pub use calendar::CalendarClock;
pub use clock::{
    ClockError, ClockListener, DEFAULT_START_TIME, ListenerError, SharedClock, SharedListener,
    VirtualClock,
};
pub use config::{ClockConfig, ConfigError, LoggingConfig, PollConfig, TimeTravelConfig};
pub use event_store::{EventBatch, EventStore, EventStoreError, SharedEventStore};

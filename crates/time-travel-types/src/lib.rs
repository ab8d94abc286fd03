//! Shared value types for the time-travel test harness.
//!
//! Everything that crosses a crate boundary lives here so the clock, the
//! event store and the readiness resolvers agree on one vocabulary.
//!
//! # Modules
//!
//! - [`time`] -- [`Timestamp`] (validated, totally ordered seconds) and
//!   [`Deadline`] (a finite instant or "never").
//! - [`ids`] -- The [`Descriptor`] bound plus ready-made descriptor handles
//!   ([`Fd`], [`HandleId`]) and the [`PollerId`] used in logs.
//! - [`events`] -- Event tags: [`SelectEvent`], [`PollFlags`] and the
//!   combined [`IoEvent`] stored in a shared event store.

pub mod events;
pub mod ids;
pub mod time;

// Re-export all public types at crate root for convenience.
pub use events::{IoEvent, PollFlags, SelectEvent};
pub use ids::{Descriptor, Fd, HandleId, PollerId};
pub use time::{Deadline, TimeError, Timestamp};

//! Deterministic `select`, `poll` and `epoll` resolvers.
//!
//! A resolver answers "which of these descriptors becomes ready first, and
//! when?" by consulting a shared [`EventStore`](time_travel_core::EventStore)
//! of scheduled [`IoEvent`](time_travel_types::IoEvent)s. It then consumes
//! the events it reported and moves the
//! [`VirtualClock`](time_travel_core::VirtualClock) to the resolution
//! instant. No call ever sleeps.
//!
//! - [`SelectResolver`] handles the three-list `select` interface.
//! - [`PollResolver`] (and its alias [`EpollResolver`]) keeps a registry of
//!   descriptors and interest masks.

pub mod error;
pub mod poll;
pub mod select;
mod timeline;

pub use error::ResolveError;
pub use poll::{EpollResolver, PollResolver};
pub use select::{SelectReady, SelectResolver};

//! Event tags attached to scheduled readiness events.
//!
//! `select` waits on three independent categories, modelled by
//! [`SelectEvent`]. `poll` and `epoll` deal in bitmasks, modelled by
//! [`PollFlags`] with the same bit values as Linux `<poll.h>`. A single
//! event store shared between both kinds of resolver stores [`IoEvent`],
//! which wraps either.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// The three readiness categories of a `select` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectEvent {
    /// The descriptor has data to read.
    Read,
    /// The descriptor can accept a write.
    Write,
    /// An exceptional condition (out-of-band data, error) is pending.
    Exceptional,
}

impl SelectEvent {
    /// All categories in `select` argument order.
    pub const ALL: [Self; 3] = [Self::Read, Self::Write, Self::Exceptional];
}

impl core::fmt::Display for SelectEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
            Self::Exceptional => f.write_str("exceptional"),
        }
    }
}

bitflags! {
    /// Poll readiness bits, numerically identical to Linux `<poll.h>`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PollFlags: u32 {
        /// There is data to read.
        const POLLIN = 0x001;
        /// There is urgent data to read.
        const POLLPRI = 0x002;
        /// Writing now will not block.
        const POLLOUT = 0x004;
        /// Error condition.
        const POLLERR = 0x008;
        /// Hung up.
        const POLLHUP = 0x010;
        /// Invalid request: descriptor not open.
        const POLLNVAL = 0x020;
    }
}

impl PollFlags {
    /// Interest mask used when a descriptor is registered without one.
    pub const DEFAULT_INTEREST: Self = Self::POLLIN.union(Self::POLLPRI).union(Self::POLLOUT);

    /// Look up a single flag by its name, case-insensitively, with or
    /// without the `POLL` prefix (`"pollin"`, `"POLLIN"`, `"in"`).
    pub fn from_flag_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_uppercase();
        if upper.starts_with("POLL") {
            Self::from_name(&upper)
        } else {
            Self::from_name(&format!("POLL{upper}"))
        }
    }
}

/// A tag in an event store shared by `select` and `poll` resolvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IoEvent {
    /// A `select` readiness category.
    Select(SelectEvent),
    /// One or more poll readiness bits.
    Poll(PollFlags),
}

impl IoEvent {
    /// Return the select category, if this is a select tag.
    pub const fn select_event(self) -> Option<SelectEvent> {
        match self {
            Self::Select(event) => Some(event),
            Self::Poll(_) => None,
        }
    }

    /// Return the poll bits, if this is a poll tag.
    pub const fn poll_flags(self) -> Option<PollFlags> {
        match self {
            Self::Poll(flags) => Some(flags),
            Self::Select(_) => None,
        }
    }
}

impl From<SelectEvent> for IoEvent {
    fn from(event: SelectEvent) -> Self {
        Self::Select(event)
    }
}

impl From<PollFlags> for IoEvent {
    fn from(flags: PollFlags) -> Self {
        Self::Poll(flags)
    }
}

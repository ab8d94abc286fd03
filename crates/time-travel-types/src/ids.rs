//! Descriptor handles.
//!
//! A descriptor is whatever a blocking call waits on: a raw file
//! descriptor, a mock socket, a test double. The harness never owns or
//! inspects descriptors; it only needs to copy them, compare them, and
//! print them in logs. The [`Descriptor`] bound captures exactly that.
//!
//! Two ready-made handles are provided: [`Fd`] for integer file
//! descriptors and [`HandleId`] for mock objects that have no natural
//! integer identity. [`PollerId`] names individual poll resolvers in logs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Anything that can stand in for an I/O handle in the event store.
///
/// `Ord` rather than `Hash` keeps store iteration deterministic across
/// runs, so two identical test scripts always see identical ready lists.
pub trait Descriptor: Clone + Ord + core::fmt::Debug + 'static {}

impl<T> Descriptor for T where T: Clone + Ord + core::fmt::Debug + 'static {}

/// A raw integer file descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fd(pub i32);

impl Fd {
    /// Return the raw descriptor number.
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl core::fmt::Display for Fd {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "fd:{}", self.0)
    }
}

impl From<i32> for Fd {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Opaque identity for a mock socket or other test double.
    ///
    /// Useful when the code under test hands around objects rather than
    /// integers: mint one `HandleId` per fake object and schedule events
    /// against it.
    HandleId
}

define_id! {
    /// Identity of a single poll resolver, attached to its log records.
    PollerId
}

//! Virtual timestamps and wait deadlines.
//!
//! A [`Timestamp`] is a count of seconds since the Unix epoch stored as
//! `f64`, the same unit `time.time()` reports. Construction validates the
//! value (finite, non-negative), which is what lets the type implement a
//! total order and act as a `BTreeMap` key.
//!
//! A [`Deadline`] is the instant a blocking call gives up: either a finite
//! [`Timestamp`] or [`Deadline::Never`] for an unbounded wait.

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Errors produced when building a [`Timestamp`] or [`Deadline`].
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum TimeError {
    /// The value is NaN or infinite.
    #[error("time value must be finite, got {value}")]
    NotFinite {
        /// The rejected value.
        value: f64,
    },

    /// The value is below zero.
    #[error("time value must not be negative, got {value}")]
    Negative {
        /// The rejected value.
        value: f64,
    },
}

/// A point on the virtual timeline, in seconds since the Unix epoch.
///
/// Always finite and non-negative. Equality, ordering and hashing all use
/// the bit pattern of the validated value, with `-0.0` folded into `0.0`.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Timestamp(f64);

impl Timestamp {
    /// The Unix epoch (`0.0` seconds).
    pub const UNIX_EPOCH: Self = Self(0.0);

    /// Validate `secs` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::NotFinite`] for NaN or infinite input and
    /// [`TimeError::Negative`] for values below zero.
    pub fn new(secs: f64) -> Result<Self, TimeError> {
        if !secs.is_finite() {
            return Err(TimeError::NotFinite { value: secs });
        }
        if secs < 0.0 {
            return Err(TimeError::Negative { value: secs });
        }
        // Adding positive zero turns -0.0 into 0.0 and leaves everything else alone.
        Ok(Self(secs + 0.0))
    }

    /// Return the raw number of seconds.
    pub const fn as_secs_f64(self) -> f64 {
        self.0
    }

    /// Return `self + seconds`, validating the result.
    ///
    /// `seconds` may be negative as long as the sum stays on the timeline.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError`] if the sum is not finite or is negative.
    pub fn checked_add(self, seconds: f64) -> Result<Self, TimeError> {
        Self::new(self.0 + seconds)
    }

    /// Return the number of seconds from `earlier` to `self` (negative if
    /// `earlier` is actually later).
    pub fn seconds_since(self, earlier: Self) -> f64 {
        self.0 - earlier.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::UNIX_EPOCH
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Timestamp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl TryFrom<f64> for Timestamp {
    type Error = TimeError;

    fn try_from(secs: f64) -> Result<Self, Self::Error> {
        Self::new(secs)
    }
}

impl From<Timestamp> for f64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

/// The instant at which a blocking wait stops waiting.
///
/// Variants are declared so the derived order puts every finite deadline
/// before [`Deadline::Never`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Deadline {
    /// The wait ends at this instant.
    At(Timestamp),
    /// The wait has no timeout.
    Never,
}

impl Deadline {
    /// Compute the deadline of a wait that starts at `now`.
    ///
    /// `None` and `+inf` both mean "no timeout".
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Negative`] for a negative timeout,
    /// [`TimeError::NotFinite`] for NaN, or the error of the addition if
    /// `now + timeout` leaves the timeline.
    pub fn after(now: Timestamp, timeout: Option<f64>) -> Result<Self, TimeError> {
        let Some(seconds) = timeout else {
            return Ok(Self::Never);
        };
        if seconds.is_nan() {
            return Err(TimeError::NotFinite { value: seconds });
        }
        if seconds < 0.0 {
            return Err(TimeError::Negative { value: seconds });
        }
        if seconds.is_infinite() {
            return Ok(Self::Never);
        }
        now.checked_add(seconds).map(Self::At)
    }

    /// Return whether this deadline is unbounded.
    pub const fn is_never(self) -> bool {
        matches!(self, Self::Never)
    }

    /// Return the finite instant, if any.
    pub const fn timestamp(self) -> Option<Timestamp> {
        match self {
            Self::At(ts) => Some(ts),
            Self::Never => None,
        }
    }

    /// Return whether an event at `ts` happens no later than this deadline.
    pub fn admits(self, ts: Timestamp) -> bool {
        match self {
            Self::At(deadline) => ts <= deadline,
            Self::Never => true,
        }
    }
}

impl From<Timestamp> for Deadline {
    fn from(ts: Timestamp) -> Self {
        Self::At(ts)
    }
}

impl fmt::Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(ts) => write!(f, "{ts}"),
            Self::Never => f.write_str("never"),
        }
    }
}

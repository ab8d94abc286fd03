//! Virtual clock and the clock-listener protocol.
//!
//! The clock is the single source of truth for "now" inside a test. It is
//! never driven by wall time: resolvers move it forward when a blocking
//! call resolves, and test code may jump it directly.
//!
//! # Design Principles
//!
//! - Every change of time is broadcast to the registered
//!   [`ClockListener`]s synchronously, in registration order, before
//!   [`VirtualClock::set_time`] returns.
//! - The first listener failure stops the broadcast and is returned to
//!   the caller. The new time has already been stored at that point;
//!   `set_time` is not transactional.
//! - Registering the same listener twice notifies it twice. Callers own
//!   that decision.

use std::cell::RefCell;
use std::rc::Rc;

use time_travel_types::{TimeError, Timestamp};
use tracing::trace;

use crate::config::ClockConfig;

/// Earliest start time accepted by every supported platform's time APIs
/// (one day after the Unix epoch). Used when no start time is given, and
/// the lowest start a clock may be created with.
pub const DEFAULT_START_TIME: f64 = 86_400.0;

/// Errors reported by a [`ClockListener`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ListenerError {
    /// The listener cannot represent the new time.
    #[error("timestamp {timestamp} is outside the representable range")]
    OutOfRange {
        /// The timestamp that could not be projected.
        timestamp: Timestamp,
    },

    /// The listener refused the change for another reason.
    #[error("listener rejected time change: {reason}")]
    Rejected {
        /// Explanation supplied by the listener.
        reason: String,
    },
}

/// Errors that can occur during clock operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClockError {
    /// The requested time is not a valid timestamp.
    #[error("invalid time: {source}")]
    Time {
        /// The underlying validation error.
        #[from]
        source: TimeError,
    },

    /// A sleep duration was negative or not finite.
    #[error("invalid sleep duration: {seconds}")]
    InvalidDuration {
        /// The rejected duration in seconds.
        seconds: f64,
    },

    /// A clock was created before [`DEFAULT_START_TIME`].
    #[error("start time {start} is before the minimum of {min}", min = DEFAULT_START_TIME)]
    BeforeMinimum {
        /// The rejected start time.
        start: Timestamp,
    },

    /// A listener failed while handling a time change.
    #[error("clock listener #{index} failed: {source}")]
    Listener {
        /// Registration index of the failing listener.
        index: usize,
        /// The listener's error.
        source: ListenerError,
    },

    /// A listener was already borrowed when the clock tried to notify it,
    /// which means the time was changed from inside a listener callback.
    #[error("clock listener #{index} is busy (re-entrant time change)")]
    ListenerBusy {
        /// Registration index of the busy listener.
        index: usize,
    },
}

/// Something that reacts to changes of virtual time.
pub trait ClockListener {
    /// Called after the clock's time has been set to `new_time`.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] if the listener cannot accept the new
    /// time. The error stops the broadcast and reaches the caller of
    /// [`VirtualClock::set_time`].
    fn on_time_changed(&mut self, new_time: Timestamp) -> Result<(), ListenerError>;
}

/// A registered listener handle.
pub type SharedListener = Rc<RefCell<dyn ClockListener>>;

/// Handle to a clock shared between resolvers and collaborators.
pub type SharedClock = Rc<RefCell<VirtualClock>>;

/// The virtual clock.
pub struct VirtualClock {
    /// Current virtual time.
    time: Timestamp,

    /// Listeners in registration order.
    listeners: Vec<SharedListener>,
}

impl VirtualClock {
    /// Create a clock at `start` with no listeners.
    pub const fn new(start: Timestamp) -> Self {
        Self {
            time: start,
            listeners: Vec::new(),
        }
    }

    /// Create a clock at `start`, refusing starts before
    /// [`DEFAULT_START_TIME`].
    ///
    /// Only the start is bounded; [`set_time`](Self::set_time) may later
    /// move the clock anywhere.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::BeforeMinimum`] if `start` is too early.
    pub fn starting_at(start: Timestamp) -> Result<Self, ClockError> {
        if start.as_secs_f64() < DEFAULT_START_TIME {
            return Err(ClockError::BeforeMinimum { start });
        }
        Ok(Self::new(start))
    }

    /// Create a clock from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Time`] if `start_time` is not a valid timestamp,
    /// or [`ClockError::BeforeMinimum`] if it is too early.
    pub fn from_config(config: &ClockConfig) -> Result<Self, ClockError> {
        Self::starting_at(Timestamp::new(config.start_time)?)
    }

    /// Wrap the clock in a [`SharedClock`] handle.
    pub fn into_shared(self) -> SharedClock {
        Rc::new(RefCell::new(self))
    }

    /// Return the current virtual time.
    pub const fn time(&self) -> Timestamp {
        self.time
    }

    /// Set the virtual time and notify every listener.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Listener`] for the first listener that fails,
    /// or [`ClockError::ListenerBusy`] if a listener is already borrowed.
    /// Listeners after the failing one are not notified.
    pub fn set_time(&mut self, new_time: Timestamp) -> Result<(), ClockError> {
        let previous = self.time;
        self.time = new_time;
        trace!(
            %previous,
            %new_time,
            listeners = self.listeners.len(),
            "Virtual time changed"
        );

        for (index, listener) in self.listeners.iter().enumerate() {
            let mut listener = listener
                .try_borrow_mut()
                .map_err(|_err| ClockError::ListenerBusy { index })?;
            listener
                .on_time_changed(new_time)
                .map_err(|source| ClockError::Listener { index, source })?;
        }
        Ok(())
    }

    /// Move the clock forward by `seconds`, as `sleep` would. Returns the
    /// new time.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidDuration`] for negative or non-finite
    /// durations, and any error [`set_time`](Self::set_time) reports.
    pub fn advance(&mut self, seconds: f64) -> Result<Timestamp, ClockError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ClockError::InvalidDuration { seconds });
        }
        let target = self.time.checked_add(seconds)?;
        self.set_time(target)?;
        Ok(target)
    }

    /// Append a listener. It will be notified on every subsequent change.
    pub fn register_listener(&mut self, listener: SharedListener) {
        self.listeners.push(listener);
    }

    /// Return the number of registered listeners.
    pub const fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new(Timestamp::new(DEFAULT_START_TIME).unwrap_or_default())
    }
}

impl core::fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VirtualClock")
            .field("time", &self.time)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

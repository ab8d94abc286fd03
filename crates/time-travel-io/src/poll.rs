//! `poll` / `epoll` emulation.
//!
//! A [`PollResolver`] owns a private registry of descriptors and interest
//! masks, exactly like a `select.poll()` object. [`PollResolver::poll`]
//! looks up the earliest scheduled poll event that intersects a
//! registered mask, reports every descriptor ready at that instant with
//! all of its ready bits merged into one mask, consumes those events and
//! moves the clock.
//!
//! Overdue events, scheduled before the current time, are all reported
//! by the next call at the current time, merged per descriptor.
//!
//! `epoll` objects behave identically and are exposed as
//! [`EpollResolver`].

use std::collections::BTreeMap;

use time_travel_core::{SharedClock, SharedEventStore};
use time_travel_types::{Deadline, Descriptor, IoEvent, PollFlags, PollerId};
use tracing::debug;

use crate::error::ResolveError;
use crate::timeline::{Consumed, Timeline};

/// Milliseconds per second, for converting poll timeouts.
const MILLIS_PER_SECOND: f64 = 1000.0;

/// The `epoll` flavor of [`PollResolver`]. There is no behavioral
/// difference.
pub type EpollResolver<D> = PollResolver<D>;

/// Resolves `poll` calls for one set of registered descriptors.
#[derive(Debug)]
pub struct PollResolver<D> {
    /// Identity used in log records.
    id: PollerId,

    /// Shared clock and event store.
    timeline: Timeline<D>,

    /// Registered descriptors and their interest masks.
    registry: BTreeMap<D, PollFlags>,

    /// Mask used by [`register`](Self::register) when none is given.
    default_interest: PollFlags,
}

impl<D: Descriptor> PollResolver<D> {
    /// Create a poller with an empty registry.
    pub fn new(clock: SharedClock, events: SharedEventStore<D, IoEvent>) -> Self {
        Self {
            id: PollerId::new(),
            timeline: Timeline::new(clock, events),
            registry: BTreeMap::new(),
            default_interest: PollFlags::DEFAULT_INTEREST,
        }
    }

    /// Replace the mask used for registrations that do not give one.
    #[must_use]
    pub const fn with_default_interest(mut self, mask: PollFlags) -> Self {
        self.default_interest = mask;
        self
    }

    /// Return this poller's log identity.
    pub const fn id(&self) -> PollerId {
        self.id
    }

    /// Return the mask used for registrations that do not give one.
    pub const fn default_interest(&self) -> PollFlags {
        self.default_interest
    }

    /// Register `descriptor`, replacing any existing mask.
    ///
    /// `None` registers [`default_interest`](Self::default_interest).
    pub fn register(&mut self, descriptor: D, mask: Option<PollFlags>) {
        let mask = mask.unwrap_or(self.default_interest);
        debug!(poller = %self.id, ?descriptor, ?mask, "Descriptor registered");
        self.registry.insert(descriptor, mask);
    }

    /// Change the mask of a registered descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownDescriptor`] if `descriptor` is not
    /// registered.
    pub fn modify(&mut self, descriptor: &D, mask: PollFlags) -> Result<(), ResolveError> {
        let slot = self
            .registry
            .get_mut(descriptor)
            .ok_or_else(|| unknown(descriptor))?;
        *slot = mask;
        debug!(poller = %self.id, ?descriptor, ?mask, "Descriptor modified");
        Ok(())
    }

    /// Stop tracking `descriptor`. Returns the mask it had.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownDescriptor`] if `descriptor` is not
    /// registered.
    pub fn unregister(&mut self, descriptor: &D) -> Result<PollFlags, ResolveError> {
        let mask = self
            .registry
            .remove(descriptor)
            .ok_or_else(|| unknown(descriptor))?;
        debug!(poller = %self.id, ?descriptor, "Descriptor unregistered");
        Ok(mask)
    }

    /// Return the mask `descriptor` is registered with, if any.
    pub fn registered(&self, descriptor: &D) -> Option<PollFlags> {
        self.registry.get(descriptor).copied()
    }

    /// Return the number of registered descriptors.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Return whether no descriptor is registered.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Wait up to `timeout_ms` milliseconds for a registered descriptor to
    /// become ready.
    ///
    /// `None` or a negative timeout waits forever. Returns one
    /// `(descriptor, mask)` pair per ready descriptor, the mask being the
    /// union of all of its events at the resolution instant. An empty list
    /// means the call timed out.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::WouldBlockForever`] if the wait is unbounded and
    ///   no matching event is scheduled.
    /// - [`ResolveError::StoreBusy`] / [`ResolveError::ClockBusy`] if
    ///   called re-entrantly from a clock listener.
    pub fn poll(&self, timeout_ms: Option<i64>) -> Result<Vec<(D, PollFlags)>, ResolveError> {
        let now = self.timeline.now()?;
        let deadline = Deadline::after(now, timeout_seconds(timeout_ms))?;

        let batches = {
            let events = self.timeline.events()?;
            events.due_matches(now, deadline, |descriptor, tag| {
                self.is_relevant(descriptor, *tag)
            })
        };

        let Some(first) = batches.first() else {
            let Deadline::At(resolved_at) = deadline else {
                return Err(ResolveError::WouldBlockForever);
            };
            self.timeline.commit(Vec::new(), resolved_at)?;
            debug!(poller = %self.id, %now, %resolved_at, "poll timed out");
            return Ok(Vec::new());
        };
        let resolved_at = first.timestamp.max(now);

        let mut merged: BTreeMap<D, PollFlags> = BTreeMap::new();
        let mut consumed: Vec<Consumed<D>> = Vec::with_capacity(batches.len());
        for batch in batches {
            for (descriptor, tags) in &batch.matches {
                let mask = merged
                    .entry(descriptor.clone())
                    .or_insert_with(PollFlags::empty);
                for flags in tags.iter().filter_map(|tag| tag.poll_flags()) {
                    *mask |= flags;
                }
            }
            consumed.push((batch.timestamp, batch.pairs()));
        }
        let ready: Vec<(D, PollFlags)> = merged.into_iter().collect();

        self.timeline.commit(consumed, resolved_at)?;

        debug!(
            poller = %self.id,
            %now,
            %resolved_at,
            ready = ready.len(),
            "poll resolved"
        );
        Ok(ready)
    }

    /// Return whether a stored tag for `descriptor` is something this
    /// poller is waiting for.
    fn is_relevant(&self, descriptor: &D, tag: IoEvent) -> bool {
        match tag {
            IoEvent::Poll(flags) => self
                .registry
                .get(descriptor)
                .is_some_and(|mask| mask.intersects(flags)),
            IoEvent::Select(_) => false,
        }
    }
}

/// Convert a poll timeout in milliseconds to seconds; `None` and negative
/// values mean "wait forever".
#[allow(clippy::cast_precision_loss)]
fn timeout_seconds(timeout_ms: Option<i64>) -> Option<f64> {
    timeout_ms
        .filter(|ms| *ms >= 0)
        .map(|ms| ms as f64 / MILLIS_PER_SECOND)
}

fn unknown<D: Descriptor>(descriptor: &D) -> ResolveError {
    ResolveError::UnknownDescriptor {
        descriptor: format!("{descriptor:?}"),
    }
}

//! Shared clock/store access for resolvers.
//!
//! A resolution always runs in two phases: read the store and the clock
//! to decide what happens, then consume the chosen events and move the
//! clock. [`Timeline::commit`] is the second phase. It is only called
//! once the resolution time is known to be finite, so a failed lookup
//! never leaves the store or clock half-updated.

use std::cell::Ref;
use std::rc::Rc;

use time_travel_core::{EventStore, SharedClock, SharedEventStore};
use time_travel_types::{Descriptor, IoEvent, Timestamp};

use crate::error::ResolveError;

/// Events consumed at one timestamp.
pub(crate) type Consumed<D> = (Timestamp, Vec<(D, IoEvent)>);

/// A resolver's view of the shared clock and event store.
#[derive(Debug)]
pub(crate) struct Timeline<D> {
    clock: SharedClock,
    events: SharedEventStore<D, IoEvent>,
}

impl<D> Clone for Timeline<D> {
    fn clone(&self) -> Self {
        Self {
            clock: Rc::clone(&self.clock),
            events: Rc::clone(&self.events),
        }
    }
}

impl<D: Descriptor> Timeline<D> {
    pub(crate) const fn new(clock: SharedClock, events: SharedEventStore<D, IoEvent>) -> Self {
        Self { clock, events }
    }

    pub(crate) fn now(&self) -> Result<Timestamp, ResolveError> {
        let clock = self
            .clock
            .try_borrow()
            .map_err(|_err| ResolveError::ClockBusy)?;
        Ok(clock.time())
    }

    pub(crate) fn events(&self) -> Result<Ref<'_, EventStore<D, IoEvent>>, ResolveError> {
        self.events
            .try_borrow()
            .map_err(|_err| ResolveError::StoreBusy)
    }

    /// Remove every consumed event, then set the clock to `resolved_at`.
    pub(crate) fn commit(
        &self,
        consumed: Vec<Consumed<D>>,
        resolved_at: Timestamp,
    ) -> Result<(), ResolveError> {
        {
            let mut events = self
                .events
                .try_borrow_mut()
                .map_err(|_err| ResolveError::StoreBusy)?;
            for (timestamp, pairs) in consumed {
                events.remove_batch(timestamp, pairs)?;
            }
        }
        // The store borrow is released: setting the clock notifies the
        // store, which borrows it again.
        let mut clock = self
            .clock
            .try_borrow_mut()
            .map_err(|_err| ResolveError::ClockBusy)?;
        clock.set_time(resolved_at)?;
        Ok(())
    }
}

//! Store of scheduled readiness events.
//!
//! Events are `(timestamp, descriptor, tag)` triples kept in a nested map:
//!
//! ```text
//! timestamp -> descriptor -> { tag, ... }
//! ```
//!
//! Both levels are ordered maps, so queries walk timestamps in ascending
//! order and descriptors in a stable order. An inner container that
//! becomes empty is removed immediately; the store never holds an empty
//! descriptor map or an empty tag set.
//!
//! The store is a [`ClockListener`]: when the clock moves, every timestamp
//! strictly before the new time is discarded. A missed event is gone for
//! good. Events exactly at the new time survive.
//!
//! Events added behind the clock are overdue. [`EventStore::due_matches`]
//! hands every overdue batch to the next waiter at once, so none of them
//! is pruned by the resolution that follows.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use time_travel_types::{Deadline, Descriptor, Timestamp};
use tracing::{trace, warn};

use crate::clock::{ClockListener, ListenerError};

/// Errors that can occur when removing events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventStoreError {
    /// The triple is not in the store. Resolvers only remove triples they
    /// have just observed, so this indicates a resolver/store
    /// desynchronization.
    #[error("no event {tag} for {descriptor} at {timestamp}")]
    EventNotFound {
        /// The timestamp that was looked up.
        timestamp: Timestamp,
        /// Debug rendering of the descriptor.
        descriptor: String,
        /// Debug rendering of the tag.
        tag: String,
    },
}

/// All matching events at a single timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBatch<D, T> {
    /// When these events are scheduled.
    pub timestamp: Timestamp,
    /// Each matching descriptor with its matching tags (never empty).
    pub matches: Vec<(D, BTreeSet<T>)>,
}

impl<D: Clone, T: Clone> EventBatch<D, T> {
    /// Flatten into `(descriptor, tag)` pairs.
    pub fn pairs(&self) -> Vec<(D, T)> {
        self.matches
            .iter()
            .flat_map(|(descriptor, tags)| {
                tags.iter().map(move |tag| (descriptor.clone(), tag.clone()))
            })
            .collect()
    }

    /// Return the matched descriptors in store order.
    pub fn descriptors(&self) -> Vec<D> {
        self.matches
            .iter()
            .map(|(descriptor, _)| descriptor.clone())
            .collect()
    }
}

/// Handle to an event store shared between resolvers.
pub type SharedEventStore<D, T> = Rc<RefCell<EventStore<D, T>>>;

/// Scheduled `(timestamp, descriptor, tag)` triples.
#[derive(Debug, Clone)]
pub struct EventStore<D, T> {
    /// `timestamp -> descriptor -> tags`.
    events: BTreeMap<Timestamp, BTreeMap<D, BTreeSet<T>>>,

    /// The most recent time reported by the clock, if any.
    now: Option<Timestamp>,
}

impl<D, T> EventStore<D, T> {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            events: BTreeMap::new(),
            now: None,
        }
    }

    /// Seed the time the store considers current, before any clock change
    /// is reported.
    #[must_use]
    pub const fn with_now(mut self, now: Timestamp) -> Self {
        self.now = Some(now);
        self
    }

    /// Return the most recent time the store was told about.
    pub const fn now(&self) -> Option<Timestamp> {
        self.now
    }

    /// Return whether no events are scheduled.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Return the earliest scheduled timestamp, regardless of descriptor.
    pub fn next_timestamp(&self) -> Option<Timestamp> {
        self.events.keys().next().copied()
    }

    /// Return the number of scheduled triples.
    pub fn len(&self) -> usize {
        self.events
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeSet::len)
            .sum()
    }

    /// Drop every scheduled event.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl<D, T> Default for EventStore<D, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, T> EventStore<D, T>
where
    D: Descriptor,
    T: Clone + Ord + core::fmt::Debug,
{
    /// Wrap the store in a [`SharedEventStore`] handle.
    pub fn into_shared(self) -> SharedEventStore<D, T> {
        Rc::new(RefCell::new(self))
    }

    /// Schedule `tag` for `descriptor` at `timestamp`.
    ///
    /// Adding a tag that is already present has no effect. Timestamps
    /// earlier than the current time are accepted; such an event is
    /// eligible as soon as a resolver looks for it.
    pub fn add_event(&mut self, timestamp: Timestamp, descriptor: D, tag: T) {
        if self.now.is_some_and(|now| timestamp < now) {
            warn!(
                %timestamp,
                now = ?self.now,
                ?descriptor,
                ?tag,
                "Event scheduled in the past; it is eligible immediately"
            );
        }
        self.events
            .entry(timestamp)
            .or_default()
            .entry(descriptor)
            .or_default()
            .insert(tag);
    }

    /// Return whether the exact triple is scheduled.
    pub fn contains(&self, timestamp: Timestamp, descriptor: &D, tag: &T) -> bool {
        self.events
            .get(&timestamp)
            .and_then(|by_descriptor| by_descriptor.get(descriptor))
            .is_some_and(|tags| tags.contains(tag))
    }

    /// Return every timestamp with at least one matching event, ascending.
    ///
    /// Each batch lists only the descriptors with a matching tag, and each
    /// descriptor's tag set is narrowed to the matching tags.
    pub fn query<P>(&self, predicate: P) -> Vec<EventBatch<D, T>>
    where
        P: Fn(&D, &T) -> bool,
    {
        self.events
            .iter()
            .filter_map(|(timestamp, by_descriptor)| {
                filter_batch(*timestamp, by_descriptor, &predicate)
            })
            .collect()
    }

    /// Return the earliest batch of matching events, if any.
    ///
    /// Equivalent to the first element of [`query`](Self::query), but stops
    /// at the first matching timestamp.
    pub fn earliest_match<P>(&self, predicate: P) -> Option<EventBatch<D, T>>
    where
        P: Fn(&D, &T) -> bool,
    {
        self.events.iter().find_map(|(timestamp, by_descriptor)| {
            filter_batch(*timestamp, by_descriptor, &predicate)
        })
    }

    /// Return the batches a waiter at `now` receives together.
    ///
    /// Every matching batch at or before `now` is overdue and returned at
    /// once, ascending. With nothing overdue, the earliest later batch is
    /// returned alone if `deadline` admits it.
    pub fn due_matches<P>(
        &self,
        now: Timestamp,
        deadline: Deadline,
        predicate: P,
    ) -> Vec<EventBatch<D, T>>
    where
        P: Fn(&D, &T) -> bool,
    {
        let mut batches = self
            .events
            .iter()
            .filter_map(|(timestamp, by_descriptor)| {
                filter_batch(*timestamp, by_descriptor, &predicate)
            })
            .peekable();

        let mut due = Vec::new();
        while let Some(batch) = batches.next_if(|batch| batch.timestamp <= now) {
            due.push(batch);
        }
        if due.is_empty() {
            due.extend(batches.next().filter(|batch| deadline.admits(batch.timestamp)));
        }
        due
    }

    /// Visit every scheduled triple in store order.
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &D, &T)> + '_ {
        self.events.iter().flat_map(|(timestamp, by_descriptor)| {
            by_descriptor.iter().flat_map(move |(descriptor, tags)| {
                tags.iter().map(move |tag| (*timestamp, descriptor, tag))
            })
        })
    }

    /// Remove one triple, dropping containers it leaves empty.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::EventNotFound`] if the triple is not
    /// scheduled. The store is left unchanged in that case.
    pub fn remove(
        &mut self,
        timestamp: Timestamp,
        descriptor: &D,
        tag: &T,
    ) -> Result<(), EventStoreError> {
        let not_found = || EventStoreError::EventNotFound {
            timestamp,
            descriptor: format!("{descriptor:?}"),
            tag: format!("{tag:?}"),
        };

        let by_descriptor = self.events.get_mut(&timestamp).ok_or_else(not_found)?;
        let tags = by_descriptor.get_mut(descriptor).ok_or_else(not_found)?;
        if !tags.remove(tag) {
            return Err(not_found());
        }
        if tags.is_empty() {
            by_descriptor.remove(descriptor);
        }
        if by_descriptor.is_empty() {
            self.events.remove(&timestamp);
        }
        Ok(())
    }

    /// Remove several `(descriptor, tag)` pairs at one timestamp.
    ///
    /// Every pair is checked before anything is removed, so either the
    /// whole batch is removed or the store is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::EventNotFound`] for the first pair that
    /// is not scheduled.
    pub fn remove_batch<I>(&mut self, timestamp: Timestamp, pairs: I) -> Result<(), EventStoreError>
    where
        I: IntoIterator<Item = (D, T)>,
    {
        let pairs: Vec<(D, T)> = pairs.into_iter().collect();
        if let Some((descriptor, tag)) = pairs
            .iter()
            .find(|(descriptor, tag)| !self.contains(timestamp, descriptor, tag))
        {
            return Err(EventStoreError::EventNotFound {
                timestamp,
                descriptor: format!("{descriptor:?}"),
                tag: format!("{tag:?}"),
            });
        }
        for (descriptor, tag) in &pairs {
            self.remove(timestamp, descriptor, tag)?;
        }
        Ok(())
    }

    /// Discard every timestamp strictly before `now`. Returns the number of
    /// triples discarded.
    pub fn prune_before(&mut self, now: Timestamp) -> usize {
        let kept = self.events.split_off(&now);
        let stale = core::mem::replace(&mut self.events, kept);
        let discarded = stale
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeSet::len)
            .sum();
        if discarded > 0 {
            trace!(%now, discarded, "Pruned missed events");
        }
        discarded
    }
}

impl<D, T> ClockListener for EventStore<D, T>
where
    D: Descriptor,
    T: Clone + Ord + core::fmt::Debug,
{
    fn on_time_changed(&mut self, new_time: Timestamp) -> Result<(), ListenerError> {
        self.now = Some(new_time);
        self.prune_before(new_time);
        Ok(())
    }
}

/// Narrow one timestamp's events to those matching `predicate`.
fn filter_batch<D, T, P>(
    timestamp: Timestamp,
    by_descriptor: &BTreeMap<D, BTreeSet<T>>,
    predicate: &P,
) -> Option<EventBatch<D, T>>
where
    D: Clone,
    T: Clone + Ord,
    P: Fn(&D, &T) -> bool,
{
    let matches: Vec<(D, BTreeSet<T>)> = by_descriptor
        .iter()
        .filter_map(|(descriptor, tags)| {
            let matching: BTreeSet<T> = tags
                .iter()
                .filter(|tag| predicate(descriptor, tag))
                .cloned()
                .collect();
            (!matching.is_empty()).then(|| (descriptor.clone(), matching))
        })
        .collect();

    (!matches.is_empty()).then_some(EventBatch { timestamp, matches })
}

//! Recorded observations printed at the end of a run.

use serde::Serialize;
use time_travel::{Fd, PollFlags, SelectReady, TimeTravel, Timestamp};

/// Something a scenario observed at one virtual instant.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    /// A `select` call returned.
    Select {
        /// Descriptors reported ready.
        ready: SelectReady<Fd>,
    },
    /// A `poll` call returned.
    Poll {
        /// Ready descriptors with their event masks.
        ready: Vec<(Fd, PollFlags)>,
    },
    /// The scenario wrote a message to a descriptor.
    Sent {
        /// Destination descriptor.
        to: Fd,
        /// Message body.
        message: String,
    },
    /// A client joined or left.
    Membership {
        /// The client descriptor.
        client: Fd,
        /// Whether it joined (`true`) or hung up.
        joined: bool,
    },
    /// The scenario gave up.
    Abandoned {
        /// Why.
        reason: String,
    },
}

/// One transcript line.
#[derive(Debug, Serialize)]
pub struct Entry {
    /// Scenario name.
    pub scenario: &'static str,
    /// Seconds of virtual time since the scenario started.
    pub elapsed_seconds: f64,
    /// Calendar projection of the virtual time.
    pub calendar: String,
    /// What happened.
    #[serde(flatten)]
    pub observation: Observation,
}

/// Ordered log of everything the scenarios observed.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    entries: Vec<Entry>,
}

impl Transcript {
    /// Record `observation` at the current virtual time of `travel`.
    ///
    /// `started` is the virtual time the scenario began at.
    pub fn record(
        &mut self,
        scenario: &'static str,
        started: Timestamp,
        travel: &TimeTravel<Fd>,
        observation: Observation,
    ) -> anyhow::Result<()> {
        self.entries.push(Entry {
            scenario,
            elapsed_seconds: travel.time()?.seconds_since(started),
            calendar: travel.now()?.to_string(),
            observation,
        });
        Ok(())
    }

    /// Return the number of recorded entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

//! Scripted programs run against their own virtual timelines.
//!
//! Each scenario builds a fresh [`TimeTravel`] from the loaded
//! configuration, schedules readiness events up front, and then behaves
//! like ordinary blocking network code. Every blocking call returns
//! immediately with the clock moved to the instant it would have woken.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use time_travel::{Fd, PollFlags, ResolveError, SelectEvent, TimeTravel, TimeTravelConfig};
use tracing::info;

use crate::transcript::{Observation, Transcript};

const MINUTE: f64 = 60.0;

/// How long the handler waits for a first message before giving up.
const WAIT_FOR_MESSAGE: f64 = 50.0 * MINUTE;

/// Wait up to 50 minutes for a message on one socket, then answer with
/// the current date and time as soon as the socket is writable.
pub fn wait_and_respond(config: &TimeTravelConfig, transcript: &mut Transcript) -> anyhow::Result<()> {
    const NAME: &str = "wait_and_respond";

    let travel: TimeTravel<Fd> = TimeTravel::from_config(config)?;
    let started = travel.time()?;
    let socket = Fd(4);
    travel.add_future_event(49.0 * MINUTE, socket, SelectEvent::Read)?;
    travel.add_future_event(49.0 * MINUTE + 2.0, socket, SelectEvent::Write)?;

    let resolver = travel.select_resolver();
    let ready = resolver.select(&[socket], &[], &[], Some(WAIT_FOR_MESSAGE))?;
    let received = ready.read.contains(&socket);
    transcript.record(NAME, started, &travel, Observation::Select { ready })?;
    if !received {
        transcript.record(
            NAME,
            started,
            &travel,
            Observation::Abandoned {
                reason: "no one connected for 50 minutes".to_owned(),
            },
        )?;
        return Ok(());
    }

    let ready = resolver.select(&[], &[socket], &[], None)?;
    let writable = ready.write.contains(&socket);
    transcript.record(NAME, started, &travel, Observation::Select { ready })?;
    if writable {
        let message = travel.now()?.to_string();
        transcript.record(
            NAME,
            started,
            &travel,
            Observation::Sent {
                to: socket,
                message,
            },
        )?;
    }

    info!(
        scenario = NAME,
        elapsed_seconds = travel.time()?.seconds_since(started),
        "Scenario finished"
    );
    Ok(())
}

/// Relay messages between clients of a listening socket using `poll`.
///
/// The listener accepts two clients. The first one sends a message, which
/// is relayed to the second once it is writable, and then both hang up.
#[allow(clippy::too_many_lines)]
pub fn chat_server(config: &TimeTravelConfig, transcript: &mut Transcript) -> anyhow::Result<()> {
    const NAME: &str = "chat_server";
    const CLIENT_INTEREST: PollFlags = PollFlags::POLLIN.union(PollFlags::POLLHUP);

    let travel: TimeTravel<Fd> = TimeTravel::from_config(config)?;
    let started = travel.time()?;
    let listener = Fd(3);
    let mut arrivals: VecDeque<Fd> = VecDeque::from([Fd(4), Fd(5)]);

    let script = [
        (1.0, listener, PollFlags::POLLIN),
        (2.0, listener, PollFlags::POLLIN),
        (5.0, Fd(4), PollFlags::POLLIN),
        (5.0, Fd(5), PollFlags::POLLOUT),
        (6.0, Fd(4), PollFlags::POLLOUT),
        (9.0, Fd(4), PollFlags::POLLHUP),
        (12.0, Fd(5), PollFlags::POLLHUP),
    ];
    for (offset, fd, flags) in script {
        travel.add_future_event(offset, fd, flags)?;
    }

    let mut poller = travel.poll_resolver();
    poller.register(listener, Some(PollFlags::POLLIN));
    let mut clients: BTreeSet<Fd> = BTreeSet::new();
    let mut outgoing: BTreeMap<Fd, Vec<String>> = BTreeMap::new();

    loop {
        let ready = match poller.poll(None) {
            Ok(ready) => ready,
            Err(ResolveError::WouldBlockForever) => {
                info!(scenario = NAME, "Nothing left to wait for");
                break;
            }
            Err(err) => return Err(err.into()),
        };
        transcript.record(
            NAME,
            started,
            &travel,
            Observation::Poll {
                ready: ready.clone(),
            },
        )?;

        for (fd, mask) in ready {
            if fd == listener {
                if let Some(client) = arrivals.pop_front() {
                    poller.register(client, Some(CLIENT_INTEREST));
                    clients.insert(client);
                    transcript.record(
                        NAME,
                        started,
                        &travel,
                        Observation::Membership {
                            client,
                            joined: true,
                        },
                    )?;
                }
                continue;
            }

            if mask.contains(PollFlags::POLLHUP) {
                poller.unregister(&fd)?;
                clients.remove(&fd);
                outgoing.remove(&fd);
                transcript.record(
                    NAME,
                    started,
                    &travel,
                    Observation::Membership {
                        client: fd,
                        joined: false,
                    },
                )?;
                continue;
            }

            if mask.contains(PollFlags::POLLIN) {
                let message = format!("hello from {fd}");
                for other in clients.iter().filter(|client| **client != fd) {
                    outgoing.entry(*other).or_default().push(message.clone());
                    poller.modify(other, CLIENT_INTEREST | PollFlags::POLLOUT)?;
                }
            }

            if mask.contains(PollFlags::POLLOUT) {
                if let Some(message) = outgoing.get_mut(&fd).and_then(Vec::pop) {
                    transcript.record(NAME, started, &travel, Observation::Sent { to: fd, message })?;
                }
                if outgoing.get(&fd).is_none_or(Vec::is_empty) {
                    outgoing.remove(&fd);
                    poller.modify(&fd, CLIENT_INTEREST)?;
                }
            }
        }

        if clients.is_empty() && arrivals.is_empty() {
            break;
        }
    }

    poller.unregister(&listener)?;
    info!(
        scenario = NAME,
        elapsed_seconds = travel.time()?.seconds_since(started),
        "Scenario finished"
    );
    Ok(())
}

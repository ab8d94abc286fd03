//! End-to-end scenarios against a [`TimeTravel`] timeline.
//!
//! Each test builds a fresh timeline, schedules readiness events, and
//! drives the resolvers the way code under test would.

#![allow(clippy::unwrap_used)]

use time_travel::{
    Fd, HandleId, PollFlags, ResolveError, SelectEvent, TimeTravel, Timestamp,
};

const MINUTE: f64 = 60.0;

fn start(travel: &TimeTravel<impl time_travel::Descriptor>) -> Timestamp {
    travel.time().unwrap()
}

fn elapsed(travel: &TimeTravel<impl time_travel::Descriptor>, since: Timestamp) -> f64 {
    travel.time().unwrap().seconds_since(since)
}

#[test]
fn select_returns_scheduled_read() {
    let travel: TimeTravel<Fd> = TimeTravel::default();
    let t0 = start(&travel);
    travel.add_future_event(2.0, Fd(1), SelectEvent::Read).unwrap();

    let ready = travel
        .select_resolver()
        .select(&[Fd(1)], &[], &[], Some(17.0))
        .unwrap();

    assert_eq!(ready.into_tuple(), (vec![Fd(1)], vec![], vec![]));
    assert!((elapsed(&travel, t0) - 2.0).abs() < f64::EPSILON);
}

#[test]
fn select_with_nothing_scheduled_times_out() {
    let travel: TimeTravel<Fd> = TimeTravel::default();
    let t0 = start(&travel);

    let ready = travel
        .select_resolver()
        .select(&[], &[], &[], Some(17.0))
        .unwrap();

    assert!(ready.is_empty());
    assert!((elapsed(&travel, t0) - 17.0).abs() < f64::EPSILON);
}

#[test]
fn poll_merges_masks_at_the_same_instant() {
    let travel: TimeTravel<Fd> = TimeTravel::default();
    let t0 = start(&travel);
    travel.add_future_event(1.0, Fd(5), PollFlags::POLLIN).unwrap();
    travel.add_future_event(2.0, Fd(5), PollFlags::POLLIN).unwrap();
    travel.add_future_event(2.0, Fd(5), PollFlags::POLLOUT).unwrap();

    let mut poller = travel.poll_resolver();
    poller.register(Fd(5), Some(PollFlags::POLLIN | PollFlags::POLLOUT));

    assert_eq!(poller.poll(None).unwrap(), vec![(Fd(5), PollFlags::POLLIN)]);
    assert!((elapsed(&travel, t0) - 1.0).abs() < f64::EPSILON);

    assert_eq!(
        poller.poll(None).unwrap(),
        vec![(Fd(5), PollFlags::POLLIN | PollFlags::POLLOUT)]
    );
    assert!((elapsed(&travel, t0) - 2.0).abs() < f64::EPSILON);
}

#[test]
fn exceptional_event_is_delivered_once() {
    let travel: TimeTravel<Fd> = TimeTravel::default();
    let t0 = start(&travel);
    travel
        .add_future_event(3.0, Fd(2), SelectEvent::Exceptional)
        .unwrap();
    let resolver = travel.select_resolver();

    let first = resolver.select(&[], &[], &[Fd(2)], Some(6.0)).unwrap();
    assert_eq!(first.exceptional, vec![Fd(2)]);
    assert!((elapsed(&travel, t0) - 3.0).abs() < f64::EPSILON);

    let second = resolver.select(&[], &[], &[Fd(2)], Some(6.0)).unwrap();
    assert!(second.is_empty());
    assert!((elapsed(&travel, t0) - 9.0).abs() < f64::EPSILON);
}

#[test]
fn unbounded_select_with_nothing_scheduled_fails() {
    let travel: TimeTravel<Fd> = TimeTravel::default();
    let t0 = start(&travel);
    // Scheduled for another descriptor, so irrelevant to this call.
    travel.add_future_event(4.0, Fd(9), SelectEvent::Read).unwrap();

    let result = travel.select_resolver().select(&[Fd(1)], &[], &[], None);

    assert_eq!(result.unwrap_err(), ResolveError::WouldBlockForever);
    assert_eq!(travel.time().unwrap(), t0);
    assert_eq!(travel.pending_events().unwrap(), 1);
}

#[test]
fn unregistering_unknown_descriptor_fails() {
    let travel: TimeTravel<Fd> = TimeTravel::default();
    let mut poller = travel.poll_resolver();

    assert!(matches!(
        poller.unregister(&Fd(42)),
        Err(ResolveError::UnknownDescriptor { .. })
    ));
}

#[test]
fn select_and_poll_share_one_timeline() {
    let travel: TimeTravel<Fd> = TimeTravel::default();
    let t0 = start(&travel);
    travel.add_future_event(5.0, Fd(1), SelectEvent::Read).unwrap();
    travel.add_future_event(8.0, Fd(1), PollFlags::POLLIN).unwrap();

    let mut poller = travel.poll_resolver();
    poller.register(Fd(1), None);
    assert_eq!(poller.poll(None).unwrap(), vec![(Fd(1), PollFlags::POLLIN)]);
    assert!((elapsed(&travel, t0) - 8.0).abs() < f64::EPSILON);

    // The select event at +5 was passed while the poller waited.
    let ready = travel
        .select_resolver()
        .select(&[Fd(1)], &[], &[], Some(1.0))
        .unwrap();
    assert!(ready.is_empty());
    assert!((elapsed(&travel, t0) - 9.0).abs() < f64::EPSILON);
}

#[test]
fn sleep_skips_over_events() {
    let travel: TimeTravel<Fd> = TimeTravel::default();
    travel.add_future_event(1.0, Fd(1), SelectEvent::Read).unwrap();
    travel.add_future_event(10.0, Fd(1), SelectEvent::Read).unwrap();
    travel.sleep(5.0).unwrap();

    let t_sleep = start(&travel);
    let ready = travel
        .select_resolver()
        .select(&[Fd(1)], &[], &[], None)
        .unwrap();
    assert_eq!(ready.read, vec![Fd(1)]);
    assert!((elapsed(&travel, t_sleep) - 5.0).abs() < f64::EPSILON);
}

/// A fake socket: records what the code under test wrote to it.
#[derive(Default)]
struct MockSocket {
    id: HandleId,
    sent: Vec<String>,
}

/// Wait up to 50 minutes for a message, then reply with the current date
/// and time once the socket is writable.
fn wait_and_respond(travel: &TimeTravel<HandleId>, socket: &mut MockSocket) -> Result<(), String> {
    let resolver = travel.select_resolver();
    let ready = resolver
        .select(&[socket.id], &[], &[], Some(50.0 * MINUTE))
        .map_err(|err| err.to_string())?;
    if ready.read.is_empty() {
        return Err("no one connected for 50 minutes".to_owned());
    }

    let ready = resolver
        .select(&[], &[socket.id], &[], None)
        .map_err(|err| err.to_string())?;
    if ready.write.contains(&socket.id) {
        socket.sent.push(travel.now().unwrap().to_string());
    }
    Ok(())
}

#[test]
fn wait_and_respond_basic() {
    let travel: TimeTravel<HandleId> = TimeTravel::default();
    let mut socket = MockSocket::default();
    travel.add_future_event(2.0, socket.id, SelectEvent::Read).unwrap();
    travel.add_future_event(3.0, socket.id, SelectEvent::Write).unwrap();

    wait_and_respond(&travel, &mut socket).unwrap();

    assert_eq!(socket.sent, vec!["1970-01-02 00:00:03 UTC".to_owned()]);
}

#[test]
fn wait_and_respond_really_long_wait() {
    let travel: TimeTravel<HandleId> = TimeTravel::default();
    let mut socket = MockSocket::default();
    travel
        .add_future_event(49.0 * MINUTE, socket.id, SelectEvent::Read)
        .unwrap();
    travel
        .add_future_event(49.0 * MINUTE + 2.0, socket.id, SelectEvent::Write)
        .unwrap();

    wait_and_respond(&travel, &mut socket).unwrap();

    assert_eq!(socket.sent, vec!["1970-01-02 00:49:02 UTC".to_owned()]);
}

#[test]
fn wait_and_respond_times_out() {
    let travel: TimeTravel<HandleId> = TimeTravel::default();
    let t0 = start(&travel);
    let mut socket = MockSocket::default();
    travel
        .add_future_event(50.0 * MINUTE + 1.0, socket.id, SelectEvent::Read)
        .unwrap();

    assert!(wait_and_respond(&travel, &mut socket).is_err());
    assert!(socket.sent.is_empty());
    assert!((elapsed(&travel, t0) - 50.0 * MINUTE).abs() < f64::EPSILON);
}

#[test]
fn wait_and_respond_never_writable() {
    let travel: TimeTravel<HandleId> = TimeTravel::default();
    let mut socket = MockSocket::default();
    travel.add_future_event(1.0, socket.id, SelectEvent::Read).unwrap();

    let err = wait_and_respond(&travel, &mut socket).unwrap_err();
    assert_eq!(err, ResolveError::WouldBlockForever.to_string());
}

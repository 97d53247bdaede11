//! End-to-end scenarios driving several engines against an in-memory
//! network, advancing a shared mock clock by hand instead of sleeping.

use std::cell::RefCell;
use std::rc::Rc;

use syncjams_common::{LocalDuration, MockClock};
use syncjams_core::testutil::Network;
use syncjams_core::{Config, Engine, NullObserver, Observer, Payload, Value};

#[derive(Default, Clone)]
struct Events(Rc<RefCell<Vec<String>>>);

impl Events {
    fn push(&self, event: String) {
        self.0.borrow_mut().push(event);
    }

    fn contains(&self, event: &str) -> bool {
        self.0.borrow().iter().any(|e| e == event)
    }

    fn count(&self, event: &str) -> usize {
        self.0.borrow().iter().filter(|e| *e == event).count()
    }
}

#[derive(Clone)]
struct RecordingObserver {
    events: Events,
}

impl Observer for RecordingObserver {
    fn on_node_joined(&mut self, node_id: u32) {
        self.events.push(format!("joined:{node_id}"));
    }

    fn on_node_left(&mut self, node_id: u32) {
        self.events.push(format!("left:{node_id}"));
    }

    fn on_message(&mut self, node_id: u32, address: &str, _value: &[Value]) {
        self.events.push(format!("message:{node_id}:{address}"));
    }
}

fn tick_period() -> LocalDuration {
    LocalDuration::from_secs_f64(60.0 / 180.0)
}

#[test]
fn bootstrap_seeds_default_bpm_and_emits_one_datagram() {
    let network = Network::new();
    let mut listener = network.connect();
    let clock = Rc::new(MockClock::new());
    let engine = Engine::new(Config::new(), network.connect(), clock, NullObserver).unwrap();

    assert_eq!(engine.state("/BPM"), Some(Payload::from(180.0)));

    let mut seen = 0;
    while listener.try_recv().is_some() {
        seen += 1;
    }
    assert_eq!(seen, 1);
}

#[test]
fn peer_join_is_observed_from_the_first_datagram_received() {
    let network = Network::new();
    let clock_a = Rc::new(MockClock::new());
    let clock_b = Rc::new(MockClock::new());
    let events_a = Events::default();

    let mut engine_a = Engine::new(
        Config::new(),
        network.connect(),
        clock_a,
        RecordingObserver {
            events: events_a.clone(),
        },
    )
    .unwrap();
    let engine_b = Engine::new(Config::new(), network.connect(), clock_b, NullObserver).unwrap();

    // b's bootstrap /state/BPM write is already sitting in a's inbox.
    engine_a.poll();

    assert!(events_a.contains(&format!("joined:{}", engine_b.node_id())));
}

#[test]
fn leave_removes_the_peer_immediately() {
    let network = Network::new();
    let clock_a = Rc::new(MockClock::new());
    let clock_b = Rc::new(MockClock::new());
    let events_a = Events::default();

    let mut engine_a = Engine::new(
        Config::new(),
        network.connect(),
        clock_a,
        RecordingObserver {
            events: events_a.clone(),
        },
    )
    .unwrap();
    let mut engine_b = Engine::new(Config::new(), network.connect(), clock_b, NullObserver).unwrap();

    engine_a.poll();
    let b_id = engine_b.node_id();
    assert!(events_a.contains(&format!("joined:{b_id}")));

    engine_b.close();
    engine_a.poll();

    assert!(events_a.contains(&format!("left:{b_id}")));
    assert!(!engine_a.node_list().contains(&b_id));
}

#[test]
fn last_writer_wins_state_converges_across_nodes() {
    let network = Network::new();
    let clock_a = Rc::new(MockClock::new());
    let clock_b = Rc::new(MockClock::new());

    let mut engine_a = Engine::new(Config::new(), network.connect(), clock_a, NullObserver).unwrap();
    let mut engine_b =
        Engine::new(Config::new(), network.connect(), clock_b.clone(), NullObserver).unwrap();

    // drain bootstrap chatter both ways
    engine_a.poll();
    engine_b.poll();

    engine_a.set_state("/fader", 1.0).unwrap();
    engine_b.poll();
    assert_eq!(engine_b.state("/fader"), Some(Payload::from(1.0)));

    // b's write lands on a strictly later tick, so it must win even though
    // a wrote more recently in wall-clock terms.
    clock_b.advance(tick_period());
    engine_b.poll();
    engine_b.set_state("/fader", 2.0).unwrap();
    engine_a.poll();

    assert_eq!(engine_a.state("/fader"), Some(Payload::from(2.0)));
    assert_eq!(engine_b.state("/fader"), Some(Payload::from(2.0)));
}

#[test]
fn dropped_messages_are_recovered_through_tick_triggered_replay() {
    let network = Network::new();
    let clock_a = Rc::new(MockClock::new());
    let clock_b = Rc::new(MockClock::new());
    let events_b = Events::default();

    let transport_a = network.connect();
    let id_a = transport_a.id();
    let transport_b = network.connect();
    let id_b = transport_b.id();

    let mut engine_a = Engine::new(Config::new(), transport_a, clock_a.clone(), NullObserver).unwrap();
    let mut engine_b = Engine::new(
        Config::new(),
        transport_b,
        clock_b.clone(),
        RecordingObserver {
            events: events_b.clone(),
        },
    )
    .unwrap();

    engine_a.poll();
    engine_b.poll();

    // Five messages in a row; the middle two are lost on the wire, the
    // other three are delivered but arrive out of sequence (their
    // predecessor never showed up), so b rejects all four after the first.
    engine_a.send("/note", 1.0).unwrap();
    network.block(id_a, id_b);
    engine_a.send("/note", 2.0).unwrap();
    engine_a.send("/note", 3.0).unwrap();
    network.unblock(id_a, id_b);
    engine_a.send("/note", 4.0).unwrap();
    engine_a.send("/note", 5.0).unwrap();
    engine_b.poll();

    let tag = format!("message:{}:/note", engine_a.node_id());
    assert_eq!(events_b.count(&tag), 1, "only the in-order first message is accepted");

    // b's next tick reports it has only accepted the first of the five; a
    // replays everything after that message_id, in order, and b accepts the
    // remaining four without re-delivering the one it already has.
    clock_b.advance(tick_period());
    engine_b.poll();
    engine_a.poll();
    engine_b.poll();

    assert_eq!(events_b.count(&tag), 5, "all five messages eventually delivered exactly once");
}

#[test]
fn peer_is_forgotten_after_the_timeout_window() {
    let network = Network::new();
    let clock_a = Rc::new(MockClock::new());
    let clock_b = Rc::new(MockClock::new());
    let events_a = Events::default();

    let mut engine_a = Engine::new(
        Config::new(),
        network.connect(),
        clock_a.clone(),
        RecordingObserver {
            events: events_a.clone(),
        },
    )
    .unwrap();
    let engine_b = Engine::new(Config::new(), network.connect(), clock_b, NullObserver).unwrap();

    engine_a.poll();
    let b_id = engine_b.node_id();
    assert!(events_a.contains(&format!("joined:{b_id}")));

    clock_a.advance(LocalDuration::from_secs(31));
    engine_a.poll();

    assert!(events_a.contains(&format!("left:{b_id}")));
    assert!(engine_a.node_list().is_empty());
}

#[test]
fn partition_heals_through_checksum_mismatch_and_state_ids_rebroadcast() {
    let network = Network::new();
    let clock_a = Rc::new(MockClock::new());
    let clock_b = Rc::new(MockClock::new());

    let transport_a = network.connect();
    let id_a = transport_a.id();
    let transport_b = network.connect();
    let id_b = transport_b.id();

    let mut engine_a =
        Engine::new(Config::new(), transport_a, clock_a.clone(), NullObserver).unwrap();
    let mut engine_b = Engine::new(Config::new(), transport_b, clock_b, NullObserver).unwrap();

    // drain bootstrap chatter both ways
    engine_a.poll();
    engine_b.poll();

    // a writes while partitioned from b, so the write never arrives.
    network.block(id_a, id_b);
    engine_a.set_state("/fader", 42.0).unwrap();
    engine_b.poll();
    assert_eq!(engine_b.state("/fader"), None);
    network.unblock(id_a, id_b);

    // a's ticks (embedding its checksum) now reach b; the checksum mismatch
    // makes b announce `/state-ids`, which tells a that b is missing an
    // entry old enough (tick + 3 <= current tick) to not just be in flight,
    // and a rebroadcasts it.
    clock_a.advance(LocalDuration::from_secs_f64(60.0 / 180.0 * 4.0));
    for _ in 0..8 {
        engine_a.poll();
        engine_b.poll();
    }

    assert_eq!(engine_b.state("/fader"), Some(Payload::from(42.0)));
}

#[test]
fn concurrent_same_tick_writes_converge_on_the_higher_offset() {
    let network = Network::new();
    let clock_a = Rc::new(MockClock::new());
    let clock_b = Rc::new(MockClock::new());

    let mut engine_a =
        Engine::new(Config::new(), network.connect(), clock_a, NullObserver).unwrap();
    let mut engine_b =
        Engine::new(Config::new(), network.connect(), clock_b.clone(), NullObserver).unwrap();

    // drain bootstrap chatter both ways
    engine_a.poll();
    engine_b.poll();

    // Both nodes write to the same address on the same tick (0); b's write
    // happens at a later offset within that tick, so it must win regardless
    // of which node observes which write first.
    engine_a.set_state("/fader", 1.0).unwrap();
    clock_b.advance(LocalDuration::from_millis(50));
    engine_b.set_state("/fader", 2.0).unwrap();

    engine_b.poll();
    engine_a.poll();

    assert_eq!(engine_a.state("/fader"), Some(Payload::from(2.0)));
    assert_eq!(engine_b.state("/fader"), Some(Payload::from(2.0)));
}

#[test]
fn rapid_state_writes_to_one_address_are_coalesced() {
    let network = Network::new();
    let mut listener = network.connect();
    let clock = Rc::new(MockClock::new());
    let mut engine = Engine::new(Config::new(), network.connect(), clock.clone(), NullObserver).unwrap();

    while listener.try_recv().is_some() {}

    engine.set_state("/fader", 1.0).unwrap();
    engine.set_state("/fader", 2.0).unwrap();
    engine.set_state("/fader", 3.0).unwrap();

    let mut immediate = 0;
    while listener.try_recv().is_some() {
        immediate += 1;
    }
    assert_eq!(immediate, 1, "only the first write should send immediately");
    assert_eq!(engine.state("/fader"), Some(Payload::from(3.0)));

    engine.poll();
    assert!(
        listener.try_recv().is_none(),
        "flush should not fire before the throttle window elapses"
    );

    clock.advance(LocalDuration::from_millis(8));
    engine.poll();

    let mut flushed = 0;
    while listener.try_recv().is_some() {
        flushed += 1;
    }
    assert_eq!(flushed, 1, "the coalesced burst flushes as a single datagram");
}

//! The node engine: owns the metronome, peer table, and state store, and
//! drives them from a transport and a wall clock via repeated `poll()`
//! calls. Mirrors the teacher's polled `StateMachine`, with the public API
//! wrapped in a command queue ([`Command`]/[`EngineHandle`]) so it can be
//! driven from another thread (Design Note: wrap public API in a
//! message queue drained by the engine, rather than requiring `&mut Engine`
//! across thread boundaries).

use std::collections::VecDeque;

use syncjams_common::{Clock, LocalTime};

use crate::codec::{self, Body};
use crate::config::Config;
use crate::constants::{BPM_KEY, DEFAULT_BPM, NODE_ID_MAX, NODE_TIMEOUT, STORE_MESSAGES};
use crate::error::Error;
use crate::metronome::Metronome;
use crate::observer::Observer;
use crate::peers::{Acceptance, PeerTable};
use crate::state::{StateEntry, StateStore};
use crate::transport::Transport;
use crate::value::Payload;

fn validate_address(address: &str) -> Result<(), Error> {
    if address.starts_with('/') {
        Ok(())
    } else {
        Err(Error::InvalidAddress)
    }
}

enum Command {
    SetState(String, Payload),
    Send(String, Payload),
    Close,
}

/// A cheap, cloneable handle that can enqueue commands onto a running
/// [`Engine`] from another thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: crossbeam_channel::Sender<Command>,
}

impl EngineHandle {
    pub fn set_state(
        &self,
        address: impl Into<String>,
        value: impl Into<Payload>,
    ) -> Result<(), Error> {
        let address = address.into();
        validate_address(&address)?;
        let _ = self.tx.send(Command::SetState(address, value.into()));
        Ok(())
    }

    pub fn send(&self, address: impl Into<String>, value: impl Into<Payload>) -> Result<(), Error> {
        let address = address.into();
        validate_address(&address)?;
        let _ = self.tx.send(Command::Send(address, value.into()));
        Ok(())
    }

    /// Request a clean shutdown. Takes effect on the engine's next `poll`.
    pub fn close(&self) {
        let _ = self.tx.send(Command::Close);
    }
}

/// A bounded ring of recently sent non-tick datagrams, kept so lagging
/// peers can be replayed to instead of re-derived from scratch.
#[derive(Debug, Default)]
struct SentQueue {
    entries: VecDeque<(u64, Vec<u8>)>,
}

impl SentQueue {
    fn push(&mut self, message_id: u64, bytes: Vec<u8>) {
        if self.entries.len() == STORE_MESSAGES {
            self.entries.pop_front();
        }
        self.entries.push_back((message_id, bytes));
    }

    fn last(&self) -> Option<&Vec<u8>> {
        self.entries.back().map(|(_, bytes)| bytes)
    }

    fn after(&self, message_id: u64) -> impl Iterator<Item = &Vec<u8>> {
        self.entries
            .iter()
            .filter(move |(id, _)| *id > message_id)
            .map(|(_, bytes)| bytes)
    }
}

/// The protocol engine for one node.
pub struct Engine<T: Transport, C: Clock, O: Observer> {
    config: Config,
    transport: T,
    clock: C,
    observer: O,
    node_id: u32,
    message_id: u64,
    metronome: Metronome,
    peers: PeerTable,
    state: StateStore,
    sent_queue: SentQueue,
    running: bool,
    cmd_tx: crossbeam_channel::Sender<Command>,
    cmd_rx: crossbeam_channel::Receiver<Command>,
}

impl<T: Transport, C: Clock, O: Observer> Engine<T, C, O> {
    /// Bind an engine to `transport`, seeding `node_id` at random and
    /// writing every entry of `config.initial_state` (plus a default
    /// `/BPM` if absent) before returning.
    pub fn new(mut config: Config, transport: T, clock: C, observer: O) -> Result<Self, Error> {
        for address in config.initial_state.keys() {
            validate_address(address)?;
        }
        config
            .initial_state
            .entry(BPM_KEY.to_string())
            .or_insert_with(|| Payload::from(DEFAULT_BPM));

        let node_id = fastrand::u32(1..=NODE_ID_MAX);
        let now = clock.local_time();
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let initial_state = std::mem::take(&mut config.initial_state);

        let mut engine = Self {
            config,
            transport,
            clock,
            observer,
            node_id,
            message_id: 0,
            metronome: Metronome::new(now),
            peers: PeerTable::new(),
            state: StateStore::new(),
            sent_queue: SentQueue::default(),
            running: false,
            cmd_tx,
            cmd_rx,
        };

        for (address, payload) in initial_state {
            engine.write_state(&address, payload);
        }

        Ok(engine)
    }

    /// A cloneable handle for driving this engine from another thread.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.cmd_tx.clone(),
        }
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn node_list(&self) -> Vec<u32> {
        self.peers.node_ids().collect()
    }

    pub fn state(&self, address: &str) -> Option<Payload> {
        self.state.get(address).cloned()
    }

    pub fn set_state(&mut self, address: &str, value: impl Into<Payload>) -> Result<(), Error> {
        validate_address(address)?;
        self.write_state(address, value.into());
        Ok(())
    }

    pub fn send(&mut self, address: &str, value: impl Into<Payload>) -> Result<(), Error> {
        validate_address(address)?;
        self.emit_message(address, value.into());
        Ok(())
    }

    /// One pass: drain queued commands, drain inbound datagrams, advance
    /// the metronome, flush throttled state writes, forget timed-out
    /// peers.
    pub fn poll(&mut self) {
        self.drain_commands();
        self.drain_inbound();
        self.advance_metronome();
        self.flush_throttled();
        self.expire_peers();
    }

    /// Send `/leave`, then loop `poll()` with a short sleep until a `Close`
    /// command is processed.
    pub fn serve_forever(&mut self) {
        self.running = true;
        while self.running {
            self.poll();
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    /// Announce `/leave` and stop. Safe to call directly even if
    /// `serve_forever` was never started.
    pub fn close(&mut self) {
        let message_id = self.next_message_id();
        let body = Body::Leave { message_id };
        if let Ok(bytes) = codec::encode_datagram(&self.config.namespace, self.node_id, &body) {
            self.transport.send_all(&bytes);
        }
        self.running = false;
    }

    fn next_message_id(&mut self) -> u64 {
        self.message_id += 1;
        self.message_id
    }

    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            match cmd {
                Command::SetState(address, payload) => self.write_state(&address, payload),
                Command::Send(address, payload) => self.emit_message(&address, payload),
                Command::Close => self.close(),
            }
        }
    }

    fn drain_inbound(&mut self) {
        // Bounded so a flood of inbound traffic can't starve the rest of
        // the poll cycle (tick advance, throttle flush, peer expiry).
        const MAX_PER_POLL: usize = 256;
        for _ in 0..MAX_PER_POLL {
            match self.transport.try_recv() {
                Some(bytes) => self.dispatch_inbound(&bytes),
                None => break,
            }
        }
    }

    fn advance_metronome(&mut self) {
        let now = self.clock.local_time();
        let bpm = self.state.bpm();
        let reached = self.metronome.advance(now, bpm);
        for tick in reached {
            self.observer.on_tick(tick, self.metronome.tick_start_time);
            self.emit_tick();
        }
    }

    fn flush_throttled(&mut self) {
        let now = self.clock.local_time();
        for (address, payload) in self.state.take_due_pending(now) {
            self.state.mark_sent(&address, now);
            let offset = self.metronome.offset(now);
            self.emit_state_write(&address, self.metronome.current_tick, offset, payload);
        }
    }

    fn expire_peers(&mut self) {
        let now = self.clock.local_time();
        for node_id in self.peers.timed_out(now, NODE_TIMEOUT) {
            self.peers.remove(node_id);
            self.observer.on_node_left(node_id);
        }
    }

    fn write_state(&mut self, address: &str, payload: Payload) {
        let now = self.clock.local_time();
        if self.state.should_throttle(address, now) {
            self.state.set_pending(address, payload);
            return;
        }
        self.state.mark_sent(address, now);
        let offset = self.metronome.offset(now);
        self.emit_state_write(address, self.metronome.current_tick, offset, payload);
    }

    fn emit_state_write(&mut self, address: &str, tick: u64, tick_offset: f64, payload: Payload) {
        let message_id = self.next_message_id();
        let accepted = self.state.apply_write(
            address,
            self.node_id,
            message_id,
            tick,
            tick_offset,
            payload.clone(),
        );
        if accepted {
            self.observer.on_state(self.node_id, address, payload.as_slice());
        }

        let body = Body::State {
            key: address.to_string(),
            message_id,
            tick,
            tick_offset,
            value: payload,
        };
        match codec::encode_datagram(&self.config.namespace, self.node_id, &body) {
            Ok(bytes) => {
                self.transport.send_all(&bytes);
                self.sent_queue.push(message_id, bytes);
            }
            Err(err) => log::warn!("failed to encode state write for {address}: {err}"),
        }
    }

    fn emit_message(&mut self, address: &str, payload: Payload) {
        let message_id = self.next_message_id();
        let body = Body::Message {
            address: address.to_string(),
            message_id,
            value: payload,
        };
        match codec::encode_datagram(&self.config.namespace, self.node_id, &body) {
            Ok(bytes) => {
                self.transport.send_all(&bytes);
                self.sent_queue.push(message_id, bytes);
            }
            Err(err) => log::warn!("failed to encode message for {address}: {err}"),
        }
    }

    fn emit_tick(&mut self) {
        let body = Body::Tick {
            tick: self.metronome.current_tick,
            checksums: self.state.checksum_triple(),
            peers: self.peers.known_msg_ids(),
        };
        match codec::encode_datagram(&self.config.namespace, self.node_id, &body) {
            Ok(bytes) => self.transport.send_all(&bytes),
            Err(err) => log::warn!("failed to encode tick: {err}"),
        }
    }

    fn emit_state_ids(&mut self) {
        let body = Body::StateIds {
            ids: self.state.all_ids(),
        };
        match codec::encode_datagram(&self.config.namespace, self.node_id, &body) {
            Ok(bytes) => self.transport.send_all(&bytes),
            Err(err) => log::warn!("failed to encode state-ids: {err}"),
        }
    }

    fn dispatch_inbound(&mut self, bytes: &[u8]) {
        let envelope = match codec::decode_datagram(&self.config.namespace, bytes) {
            Ok(envelope) => envelope,
            Err(reason) => {
                log::debug!("dropped inbound datagram: {reason}");
                return;
            }
        };
        // Our own broadcasts loop back on a broadcast socket; never treat
        // ourselves as a peer.
        if envelope.node_id == self.node_id {
            return;
        }

        let now = self.clock.local_time();
        let node_id = envelope.node_id;
        if self.peers.touch(node_id, now) {
            self.observer.on_node_joined(node_id);
        }

        match envelope.body {
            Body::Tick {
                tick,
                checksums,
                peers,
            } => self.handle_tick(tick, checksums, peers, now),
            Body::Leave { .. } => self.handle_leave(node_id),
            Body::StateIds { ids } => self.handle_state_ids(&ids),
            Body::State {
                key,
                message_id,
                tick,
                tick_offset,
                value,
            } => self.handle_state_write(node_id, message_id, &key, tick, tick_offset, value),
            Body::Message {
                address,
                message_id,
                value,
            } => self.handle_message(node_id, message_id, &address, value),
        }
    }

    fn handle_tick(
        &mut self,
        tick: u64,
        checksums: [u32; 3],
        peers: Vec<(u32, u64)>,
        now: LocalTime,
    ) {
        if self.metronome.jump(tick, now) {
            self.observer
                .on_tick(self.metronome.current_tick, self.metronome.tick_start_time);
            self.emit_tick();
        }

        if checksums != self.state.checksum_triple() {
            self.emit_state_ids();
        }

        match peers.iter().find(|(peer_id, _)| *peer_id == self.node_id) {
            None => {
                if let Some(bytes) = self.sent_queue.last().cloned() {
                    self.transport.send_all(&bytes);
                }
            }
            Some((_, their_last_accepted)) => {
                let replay: Vec<Vec<u8>> = self
                    .sent_queue
                    .after(*their_last_accepted)
                    .cloned()
                    .collect();
                for bytes in replay {
                    self.transport.send_all(&bytes);
                }
            }
        }
    }

    fn handle_leave(&mut self, node_id: u32) {
        if self.peers.remove(node_id) {
            self.observer.on_node_left(node_id);
        }
    }

    fn handle_state_ids(&mut self, ids: &[(u32, u64)]) {
        let missing = self.state.missing_from(ids, self.metronome.current_tick);
        for address in missing {
            if let Some(entry) = self.state.entry(&address).cloned() {
                self.rebroadcast_state(&address, entry);
            }
        }
    }

    fn rebroadcast_state(&mut self, address: &str, entry: StateEntry) {
        self.emit_state_write(address, entry.tick, entry.tick_offset, entry.payload);
    }

    fn handle_state_write(
        &mut self,
        node_id: u32,
        message_id: u64,
        address: &str,
        tick: u64,
        tick_offset: f64,
        value: Payload,
    ) {
        // State writes track ordering for replay bookkeeping the same as
        // any other datagram, but never gate on it: last-writer-wins
        // ordering via (tick, tick_offset) is the real conflict resolution.
        let _ = self.peers.check_message(node_id, message_id);
        let accepted = self.state.apply_write(
            address,
            node_id,
            message_id,
            tick,
            tick_offset,
            value.clone(),
        );
        if accepted {
            self.observer.on_state(node_id, address, value.as_slice());
        }
    }

    fn handle_message(&mut self, node_id: u32, message_id: u64, address: &str, value: Payload) {
        if self.peers.check_message(node_id, message_id) == Acceptance::Accept {
            self.observer.on_message(node_id, address, value.as_slice());
        }
    }
}

//! Peer liveness and per-sender message ordering.

use std::collections::HashMap;

use syncjams_common::{LocalDuration, LocalTime};

use crate::constants::STORE_MESSAGES;

/// What happened to an inbound, sequence-tracked datagram.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Acceptance {
    /// In order (or the sender's first datagram); delivered.
    Accept,
    /// Out of order, a duplicate, or older than what we've already taken
    /// from this sender; silently dropped.
    Drop,
}

#[derive(Debug, Clone, Default)]
struct PeerRecord {
    last_seen: LocalTime,
    last_accepted_msg_id: Option<u64>,
}

/// Tracks every peer we've heard from: when, and how far we've accepted
/// their message stream.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<u32, PeerRecord>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `node_id` was just heard from. Returns `true` if this is
    /// the first time we've seen it.
    pub fn touch(&mut self, node_id: u32, now: LocalTime) -> bool {
        let is_new = !self.peers.contains_key(&node_id);
        self.peers.entry(node_id).or_default().last_seen = now;
        is_new
    }

    /// Remove a peer, e.g. on `/leave` or timeout. Returns `true` if it was
    /// present.
    pub fn remove(&mut self, node_id: u32) -> bool {
        self.peers.remove(&node_id).is_some()
    }

    /// Every peer we currently consider live.
    pub fn node_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.peers.keys().copied()
    }

    /// Peers not heard from within `timeout`, to be forgotten.
    pub fn timed_out(&self, now: LocalTime, timeout: LocalDuration) -> Vec<u32> {
        self.peers
            .iter()
            .filter(|(_, record)| now - record.last_seen > timeout)
            .map(|(node_id, _)| *node_id)
            .collect()
    }

    /// Our view of every peer's `last_accepted_msg_id`, for our own outbound
    /// `/tick`.
    pub fn known_msg_ids(&self) -> Vec<(u32, u64)> {
        self.peers
            .iter()
            .filter_map(|(node_id, record)| record.last_accepted_msg_id.map(|m| (*node_id, m)))
            .collect()
    }

    /// Apply the in-order acceptance rule to a sequence-numbered datagram
    /// from `node_id`. Three cases accept: the sender's first-ever datagram,
    /// the immediate successor of the last accepted id, and a `message_id`
    /// far enough below the last accepted id (more than `STORE_MESSAGES`
    /// behind) to mean the sender itself restarted and reset its counter —
    /// without this branch a restarted peer's counter resuming at a low
    /// number is never `last_accepted + 1` again and is dropped forever.
    pub fn check_message(&mut self, node_id: u32, message_id: u64) -> Acceptance {
        let record = self.peers.entry(node_id).or_default();
        match record.last_accepted_msg_id {
            None => {
                record.last_accepted_msg_id = Some(message_id);
                Acceptance::Accept
            }
            Some(last) if message_id == last + 1 => {
                record.last_accepted_msg_id = Some(message_id);
                Acceptance::Accept
            }
            Some(last) if message_id < last.saturating_sub(STORE_MESSAGES as u64) => {
                record.last_accepted_msg_id = Some(message_id);
                Acceptance::Accept
            }
            _ => Acceptance::Drop,
        }
    }
}

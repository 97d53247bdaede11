//! The last-writer-wins state map and its throttled write path.

use std::collections::HashMap;

use syncjams_common::LocalTime;

use crate::constants::{BPM_KEY, DEFAULT_BPM, STATE_THROTTLE_TIME};
use crate::value::Payload;

/// A single accepted state write.
#[derive(Debug, Clone)]
pub struct StateEntry {
    pub origin_node_id: u32,
    pub origin_msg_id: u64,
    pub tick: u64,
    pub tick_offset: f64,
    pub payload: Payload,
}

/// Ordering used to decide whether an incoming write supersedes the entry
/// already held for an address: higher tick wins; on a tied tick, higher
/// `tick_offset` wins; a full tie (tick and offset both equal) keeps
/// whichever entry is already there.
fn is_newer(candidate_tick: u64, candidate_offset: f64, existing: &StateEntry) -> bool {
    candidate_tick > existing.tick
        || (candidate_tick == existing.tick && candidate_offset > existing.tick_offset)
}

#[derive(Debug, Clone, Default)]
struct ThrottleEntry {
    last_send_time: LocalTime,
    pending: Option<Payload>,
}

/// The state map plus the per-address write throttle that coalesces bursts
/// of local writes into one outbound datagram every
/// [`crate::constants::STATE_THROTTLE_TIME`].
#[derive(Debug, Default)]
pub struct StateStore {
    entries: HashMap<String, StateEntry>,
    throttle: HashMap<String, ThrottleEntry>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> Option<&Payload> {
        self.entries.get(address).map(|e| &e.payload)
    }

    pub fn entry(&self, address: &str) -> Option<&StateEntry> {
        self.entries.get(address)
    }

    /// Tempo to drive the metronome with: the numeric value of `/BPM`, or
    /// the protocol default if it is missing or non-positive.
    pub fn bpm(&self) -> f64 {
        self.entries
            .get(BPM_KEY)
            .and_then(|e| e.payload.as_slice().first())
            .and_then(|v| v.as_f64())
            .filter(|bpm| *bpm > 0.0)
            .unwrap_or(DEFAULT_BPM)
    }

    /// Apply a write (local or remote) if it is newer than what's already
    /// stored. Returns whether it was accepted.
    pub fn apply_write(
        &mut self,
        address: &str,
        origin_node_id: u32,
        origin_msg_id: u64,
        tick: u64,
        tick_offset: f64,
        payload: Payload,
    ) -> bool {
        let accept = match self.entries.get(address) {
            None => true,
            Some(existing) => is_newer(tick, tick_offset, existing),
        };
        if accept {
            self.entries.insert(
                address.to_string(),
                StateEntry {
                    origin_node_id,
                    origin_msg_id,
                    tick,
                    tick_offset,
                    payload,
                },
            );
        }
        accept
    }

    /// `(origin_node_id, origin_msg_id)` for every entry we hold, for
    /// `/state-ids` anti-entropy broadcasts.
    pub fn all_ids(&self) -> Vec<(u32, u64)> {
        self.entries
            .values()
            .map(|e| (e.origin_node_id, e.origin_msg_id))
            .collect()
    }

    /// Addresses whose origin is absent from `known` and whose tick is old
    /// enough (`tick + 3 <= current_tick`) that the gap is unlikely to be a
    /// datagram still in flight, rather than a genuine miss.
    pub fn missing_from(&self, known: &[(u32, u64)], current_tick: u64) -> Vec<String> {
        let known: std::collections::HashSet<(u32, u64)> = known.iter().copied().collect();
        self.entries
            .iter()
            .filter(|(_, e)| {
                !known.contains(&(e.origin_node_id, e.origin_msg_id)) && e.tick + 3 <= current_tick
            })
            .map(|(address, _)| address.clone())
            .collect()
    }

    /// A column of every triple of values from all entries, sorted
    /// ascending and folded with [`fold_checksum`], for cheap anti-entropy
    /// comparison between peers.
    pub fn checksum_triple(&self) -> [u32; 3] {
        let mut origins: Vec<i64> = Vec::with_capacity(self.entries.len());
        let mut msg_ids: Vec<i64> = Vec::with_capacity(self.entries.len());
        let mut ticks: Vec<i64> = Vec::with_capacity(self.entries.len());
        for entry in self.entries.values() {
            origins.push(entry.origin_node_id as i64);
            msg_ids.push(entry.origin_msg_id as i64);
            ticks.push(entry.tick as i64);
        }
        origins.sort_unstable();
        msg_ids.sort_unstable();
        ticks.sort_unstable();
        [
            fold_checksum(&origins),
            fold_checksum(&msg_ids),
            fold_checksum(&ticks),
        ]
    }

    // --- write throttle -----------------------------------------------

    /// Whether a write to `address` right now would need to be coalesced
    /// rather than sent immediately.
    pub fn should_throttle(&self, address: &str, now: LocalTime) -> bool {
        match self.throttle.get(address) {
            Some(t) => t.last_send_time + STATE_THROTTLE_TIME > now,
            None => false,
        }
    }

    /// Stash `payload` as the value to send once the throttle window opens.
    /// A later call before the flush overwrites the pending value, so only
    /// the most recent write in a burst is ever sent.
    pub fn set_pending(&mut self, address: &str, payload: Payload) {
        self.throttle.entry(address.to_string()).or_default().pending = Some(payload);
    }

    /// Record that `address` was just sent, resetting the throttle window.
    pub fn mark_sent(&mut self, address: &str, now: LocalTime) {
        let entry = self.throttle.entry(address.to_string()).or_default();
        entry.last_send_time = now;
        entry.pending = None;
    }

    /// Pull out every pending write whose throttle window has now elapsed.
    pub fn take_due_pending(&mut self, now: LocalTime) -> Vec<(String, Payload)> {
        self.throttle
            .iter_mut()
            .filter(|(_, entry)| {
                entry.pending.is_some() && entry.last_send_time + STATE_THROTTLE_TIME <= now
            })
            .map(|(address, entry)| (address.clone(), entry.pending.take().unwrap()))
            .collect()
    }
}

/// The protocol's deliberately weak checksum fold. Processes `values` in
/// the exact order given — callers that need an order-independent result
/// (anti-entropy comparison across peers whose entries may be iterated in
/// different orders) must sort first, as [`StateStore::checksum_triple`]
/// does.
pub fn fold_checksum(values: &[i64]) -> u32 {
    let mut h: i64 = 5381;
    for v in values {
        let a = (33 * h).rem_euclid(65535);
        let b = v.rem_euclid(65535);
        h = (a ^ b).rem_euclid(65535);
    }
    h as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_known_vectors() {
        assert_eq!(fold_checksum(&[12, 432, 3, 0, 2343]), 28632);
        assert_eq!(
            fold_checksum(&[122112, 4321, 123, 11, 14, 4, 43, 8388606, 3, 432, 545]),
            36600
        );
    }

    #[test]
    fn newer_tick_wins_regardless_of_offset() {
        let mut store = StateStore::new();
        assert!(store.apply_write("/fader", 1, 1, 5, 0.9, Payload::from(1.0)));
        assert!(store.apply_write("/fader", 2, 1, 6, 0.0, Payload::from(2.0)));
        assert_eq!(store.get("/fader"), Some(&Payload::from(2.0)));
    }

    #[test]
    fn tied_tick_breaks_on_offset() {
        let mut store = StateStore::new();
        assert!(store.apply_write("/fader", 1, 1, 5, 0.2, Payload::from(1.0)));
        assert!(!store.apply_write("/fader", 2, 1, 5, 0.1, Payload::from(2.0)));
        assert!(store.apply_write("/fader", 2, 2, 5, 0.3, Payload::from(3.0)));
        assert_eq!(store.get("/fader"), Some(&Payload::from(3.0)));
    }

    #[test]
    fn full_tie_retains_existing_entry() {
        let mut store = StateStore::new();
        assert!(store.apply_write("/fader", 1, 1, 5, 0.2, Payload::from(1.0)));
        assert!(!store.apply_write("/fader", 2, 2, 5, 0.2, Payload::from(2.0)));
        assert_eq!(store.get("/fader"), Some(&Payload::from(1.0)));
    }

    #[test]
    fn bpm_falls_back_to_default_when_missing_or_invalid() {
        let mut store = StateStore::new();
        assert_eq!(store.bpm(), DEFAULT_BPM);
        store.apply_write(BPM_KEY, 1, 1, 0, 0.0, Payload::from(-1.0));
        assert_eq!(store.bpm(), DEFAULT_BPM);
        store.apply_write(BPM_KEY, 1, 2, 1, 0.0, Payload::from(140.0));
        assert_eq!(store.bpm(), 140.0);
    }
}

//! Protocol constants. Mirrors the teacher's `common::network::PROTOCOL_VERSION`
//! style of collecting wire-level magic numbers in one place.

use syncjams_common::LocalDuration;

/// Default UDP port the node binds and broadcasts to.
pub const PORT: u16 = 23232;

/// OSC address namespace every SyncJams datagram lives under.
pub const NAMESPACE: &str = "/syncjams";

/// Number of outbound datagrams kept for replay to lagging peers.
pub const STORE_MESSAGES: usize = 100;

/// A peer not heard from in this long is forgotten.
pub const NODE_TIMEOUT: LocalDuration = LocalDuration::from_secs(30);

/// Minimum spacing between two outbound writes to the same state address.
pub const STATE_THROTTLE_TIME: LocalDuration = LocalDuration::from_millis(7);

/// Wire protocol version string carried in every envelope.
pub const PROTOCOL_VERSION: &str = "v1";

/// Tempo used when no `/BPM` entry has been written yet.
pub const DEFAULT_BPM: f64 = 180.0;

/// State key the metronome reads its tempo from.
pub const BPM_KEY: &str = "/BPM";

/// `node_id` is drawn from `1..=NODE_ID_MAX`; zero is reserved so a missing
/// field can never be mistaken for a valid id.
pub const NODE_ID_MAX: u32 = 1 << 23;

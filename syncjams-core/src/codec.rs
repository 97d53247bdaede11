//! Envelope encode/decode: turns [`syncjams_wire`]'s address+args pairs into
//! the typed SyncJams message set, and back.
//!
//! Every address below is namespace-relative — `encode_datagram`/
//! `decode_datagram` add and strip [`crate::constants::NAMESPACE`] so the
//! rest of the engine only ever deals in logical addresses like `/BPM` or
//! `/fader`.

use thiserror::Error;

use syncjams_wire::{Value, WireError};

use crate::constants::PROTOCOL_VERSION;
use crate::value::Payload;

/// A decoded, namespace-stripped inbound datagram.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub node_id: u32,
    pub body: Body,
}

/// The SyncJams message set. One variant per wire sub-path.
#[derive(Debug, Clone)]
pub enum Body {
    /// `/tick`: the sender's tick counter, state checksum triple, and its
    /// view of every other peer's `last_accepted_msg_id`.
    Tick {
        tick: u64,
        checksums: [u32; 3],
        peers: Vec<(u32, u64)>,
    },
    /// `/leave`: the sender is shutting down cleanly.
    Leave { message_id: u64 },
    /// `/state-ids`: the sender's full set of known `(origin_node_id,
    /// origin_msg_id)` pairs, for anti-entropy.
    StateIds { ids: Vec<(u32, u64)> },
    /// `/state/<key...>`: a last-writer-wins state write.
    State {
        key: String,
        message_id: u64,
        tick: u64,
        tick_offset: f64,
        value: Payload,
    },
    /// Any other address: an application message.
    Message {
        address: String,
        message_id: u64,
        value: Payload,
    },
}

/// Why an inbound datagram was dropped before reaching the dispatcher.
#[derive(Error, Debug)]
pub enum DropReason {
    #[error("wire decode failed: {0}")]
    Wire(#[from] WireError),
    #[error("address is not under our namespace")]
    BadNamespace,
    #[error("missing or mismatched protocol version")]
    WrongVersion,
    #[error("missing or out of range node_id")]
    BadNodeId,
    #[error("no sub-address after the namespace")]
    NoAddress,
    #[error("malformed {0} payload")]
    Malformed(&'static str),
}

/// Encode a datagram for `body`, sent by `node_id`, under `namespace`.
pub fn encode_datagram(namespace: &str, node_id: u32, body: &Body) -> Result<Vec<u8>, WireError> {
    let mut args = vec![
        Value::Str(PROTOCOL_VERSION.to_string()),
        Value::Int(node_id as i64),
    ];

    let address = match body {
        Body::Tick {
            tick,
            checksums,
            peers,
        } => {
            args.push(Value::Int(*tick as i64));
            for c in checksums {
                args.push(Value::Int(*c as i64));
            }
            for (peer_id, msg_id) in peers {
                args.push(Value::Int(*peer_id as i64));
                args.push(Value::Int(*msg_id as i64));
            }
            format!("{namespace}/tick")
        }
        Body::Leave { message_id } => {
            args.push(Value::Int(*message_id as i64));
            format!("{namespace}/leave")
        }
        Body::StateIds { ids } => {
            for (peer_id, msg_id) in ids {
                args.push(Value::Int(*peer_id as i64));
                args.push(Value::Int(*msg_id as i64));
            }
            format!("{namespace}/state-ids")
        }
        Body::State {
            key,
            message_id,
            tick,
            tick_offset,
            value,
        } => {
            args.push(Value::Int(*message_id as i64));
            args.push(Value::Int(*tick as i64));
            args.push(Value::Float(*tick_offset));
            args.extend(value.as_slice().iter().cloned());
            format!("{namespace}/state{key}")
        }
        Body::Message {
            address,
            message_id,
            value,
        } => {
            args.push(Value::Int(*message_id as i64));
            args.extend(value.as_slice().iter().cloned());
            format!("{namespace}{address}")
        }
    };

    syncjams_wire::encode_message(&address, &args)
}

/// Decode a raw datagram, stripping `namespace` and routing on the first
/// remaining path segment.
pub fn decode_datagram(namespace: &str, bytes: &[u8]) -> Result<Envelope, DropReason> {
    let (address, args) = syncjams_wire::decode_message(bytes)?;

    let prefix = format!("{namespace}/");
    let rest = address
        .strip_prefix(&prefix)
        .ok_or(DropReason::BadNamespace)?;

    let mut it = args.into_iter();
    let version = it.next().ok_or(DropReason::WrongVersion)?;
    if version.as_str() != Some(PROTOCOL_VERSION) {
        return Err(DropReason::WrongVersion);
    }

    let node_id = it
        .next()
        .and_then(|v| v.as_u64())
        .filter(|id| *id > 0 && *id <= crate::constants::NODE_ID_MAX as u64)
        .ok_or(DropReason::BadNodeId)? as u32;

    if rest.is_empty() {
        return Err(DropReason::NoAddress);
    }
    let route: Vec<&str> = rest.split('/').collect();
    let remaining: Vec<Value> = it.collect();

    let body = match route[0] {
        "tick" => decode_tick(&remaining)?,
        "leave" => decode_leave(&remaining)?,
        "state-ids" => decode_state_ids(&remaining),
        "state" => decode_state(&route[1..], remaining)?,
        _ => decode_message(rest, remaining)?,
    };

    Ok(Envelope { node_id, body })
}

fn decode_tick(args: &[Value]) -> Result<Body, DropReason> {
    if args.len() < 4 {
        return Err(DropReason::Malformed("tick"));
    }
    let tick = args[0].as_u64().ok_or(DropReason::Malformed("tick"))?;
    let mut checksums = [0u32; 3];
    for (slot, arg) in checksums.iter_mut().zip(&args[1..4]) {
        *slot = arg.as_u64().ok_or(DropReason::Malformed("tick checksum"))? as u32;
    }

    let rest = &args[4..];
    if rest.len() % 2 != 0 {
        return Err(DropReason::Malformed("tick peer list"));
    }
    let mut peers = Vec::with_capacity(rest.len() / 2);
    for pair in rest.chunks_exact(2) {
        let peer_id = pair[0]
            .as_u64()
            .ok_or(DropReason::Malformed("tick peer id"))? as u32;
        let msg_id = pair[1]
            .as_u64()
            .ok_or(DropReason::Malformed("tick peer msg_id"))?;
        peers.push((peer_id, msg_id));
    }

    Ok(Body::Tick {
        tick,
        checksums,
        peers,
    })
}

fn decode_leave(args: &[Value]) -> Result<Body, DropReason> {
    let message_id = args
        .first()
        .and_then(Value::as_u64)
        .ok_or(DropReason::Malformed("leave"))?;
    Ok(Body::Leave { message_id })
}

fn decode_state_ids(args: &[Value]) -> Body {
    let ids = args
        .chunks_exact(2)
        .filter_map(|pair| Some((pair[0].as_u64()? as u32, pair[1].as_u64()?)))
        .collect();
    Body::StateIds { ids }
}

fn decode_state(key_segments: &[&str], mut args: Vec<Value>) -> Result<Body, DropReason> {
    if key_segments.is_empty() || key_segments.iter().any(|s| s.is_empty()) {
        return Err(DropReason::Malformed("state key"));
    }
    if args.len() < 3 {
        return Err(DropReason::Malformed("state"));
    }
    let value = Payload(args.split_off(3));
    let tick_offset = args[2].as_f64().ok_or(DropReason::Malformed("state"))?;
    let tick = args[1].as_u64().ok_or(DropReason::Malformed("state"))?;
    let message_id = args[0].as_u64().ok_or(DropReason::Malformed("state"))?;

    Ok(Body::State {
        key: format!("/{}", key_segments.join("/")),
        message_id,
        tick,
        tick_offset,
        value,
    })
}

fn decode_message(route: &str, mut args: Vec<Value>) -> Result<Body, DropReason> {
    if args.is_empty() {
        return Err(DropReason::Malformed("message"));
    }
    let value = Payload(args.split_off(1));
    let message_id = args[0].as_u64().ok_or(DropReason::Malformed("message"))?;

    Ok(Body::Message {
        address: format!("/{route}"),
        message_id,
        value,
    })
}

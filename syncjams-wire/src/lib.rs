//! A thin adapter over [`rosc`] that turns it into exactly what the SyncJams
//! protocol needs: an OSC address string plus an ordered list of typed,
//! non-null scalar arguments. This crate does not know anything about
//! namespaces, node ids, ticks, or state — that belongs to
//! `syncjams-core::codec`, which builds the SyncJams envelope on top of the
//! raw messages encoded here.

use rosc::{OscMessage, OscPacket, OscType};
use thiserror::Error;

/// A single typed OSC argument. Never null: `rosc::OscType::Nil` and
/// `OscType::Inf` decode to a [`WireError::UnsupportedArgument`] instead of
/// a `Value` variant, since SyncJams has no use for them and callers must
/// not be able to construct one through this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A 64-bit integer. Encoded on the wire as an OSC `Long`.
    Int(i64),
    /// A 64-bit float. Encoded on the wire as an OSC `Double`.
    Float(f64),
    /// A UTF-8 string.
    Str(String),
}

impl Value {
    /// Parse this value as a non-negative integer, the way `node_id` and
    /// `message_id` fields are parsed off the wire.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(i) if *i >= 0 => Some(*i as u64),
            _ => None,
        }
    }

    /// Parse this value as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Parse this value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<&Value> for OscType {
    fn from(v: &Value) -> Self {
        match v {
            Value::Int(i) => OscType::Long(*i),
            Value::Float(f) => OscType::Double(*f),
            Value::Str(s) => OscType::String(s.clone()),
        }
    }
}

/// Failures from encoding or decoding a raw OSC message.
#[derive(Error, Debug)]
pub enum WireError {
    /// The underlying `rosc` encoder rejected the message.
    #[error("osc encode error: {0:?}")]
    Encode(rosc::OscError),
    /// The datagram could not be parsed as an OSC packet.
    #[error("osc decode error: {0:?}")]
    Decode(rosc::OscError),
    /// The packet decoded, but was an OSC bundle rather than a single message.
    #[error("bundles are not supported")]
    UnsupportedBundle,
    /// An argument used a type SyncJams has no representation for.
    #[error("unsupported OSC argument type")]
    UnsupportedArgument,
}

/// Encode an OSC address and argument list into a raw datagram.
pub fn encode_message(address: &str, args: &[Value]) -> Result<Vec<u8>, WireError> {
    let packet = OscPacket::Message(OscMessage {
        addr: address.to_string(),
        args: args.iter().map(OscType::from).collect(),
    });
    rosc::encoder::encode(&packet).map_err(WireError::Encode)
}

/// Decode a raw datagram into an OSC address and argument list.
pub fn decode_message(bytes: &[u8]) -> Result<(String, Vec<Value>), WireError> {
    let (_, packet) = rosc::decoder::decode_udp(bytes).map_err(WireError::Decode)?;
    let message = match packet {
        OscPacket::Message(m) => m,
        OscPacket::Bundle(_) => return Err(WireError::UnsupportedBundle),
    };
    let mut args = Vec::with_capacity(message.args.len());
    for arg in message.args {
        args.push(convert_arg(arg)?);
    }
    Ok((message.addr, args))
}

fn convert_arg(arg: OscType) -> Result<Value, WireError> {
    match arg {
        OscType::Int(i) => Ok(Value::Int(i as i64)),
        OscType::Long(i) => Ok(Value::Int(i)),
        OscType::Float(f) => Ok(Value::Float(f as f64)),
        OscType::Double(f) => Ok(Value::Float(f)),
        OscType::String(s) => Ok(Value::Str(s)),
        _ => Err(WireError::UnsupportedArgument),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_typed_arguments() {
        let args = vec![
            Value::Str("v1".into()),
            Value::Int(42),
            Value::Float(1.5),
        ];
        let bytes = encode_message("/syncjams/tick", &args).unwrap();
        let (addr, decoded) = decode_message(&bytes).unwrap();

        assert_eq!(addr, "/syncjams/tick");
        assert_eq!(decoded, args);
    }

    #[test]
    fn rejects_nil_arguments() {
        let packet = OscPacket::Message(OscMessage {
            addr: "/syncjams/tick".to_string(),
            args: vec![OscType::Nil],
        });
        let bytes = rosc::encoder::encode(&packet).unwrap();

        assert!(matches!(
            decode_message(&bytes),
            Err(WireError::UnsupportedArgument)
        ));
    }
}

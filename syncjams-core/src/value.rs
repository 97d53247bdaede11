//! The typed value list carried by every `/state` and message datagram.
//!
//! Built on top of [`syncjams_wire::Value`], which already excludes OSC
//! `Nil`/`Inf` at the wire boundary. [`Payload`] adds the one conversion the
//! protocol actually needs day to day: building a value list out of a
//! `serde_json::Value`, which is how a REPL or HTTP front end would hand a
//! dynamically typed value in. That boundary is also where a literal JSON
//! `null` (or an array containing one) is rejected, since a native Rust
//! `Payload` has no way to represent one in the first place.

use serde_json::Value as JsonValue;
use syncjams_wire::Value;

use crate::error::Error;

/// An ordered, non-empty-or-empty list of typed scalars attached to a state
/// entry or a message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Payload(pub Vec<Value>);

impl Payload {
    /// The empty payload, used for messages that only carry an address.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Borrow the values as a slice, the shape [`crate::Observer`] callbacks
    /// receive them in.
    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }
}

impl From<Vec<Value>> for Payload {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl From<f64> for Payload {
    fn from(v: f64) -> Self {
        Self(vec![Value::Float(v)])
    }
}

impl From<i64> for Payload {
    fn from(v: i64) -> Self {
        Self(vec![Value::Int(v)])
    }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self {
        Self(vec![Value::Str(v.to_string())])
    }
}

impl From<String> for Payload {
    fn from(v: String) -> Self {
        Self(vec![Value::Str(v)])
    }
}

impl TryFrom<JsonValue> for Payload {
    type Error = Error;

    /// A bare scalar becomes a one-element payload; an array becomes a
    /// payload with one entry per element. Anything else — `null`, an
    /// object, or an array containing `null` — is rejected as an invalid
    /// value.
    fn try_from(json: JsonValue) -> Result<Self, Error> {
        match json {
            JsonValue::Array(items) => items
                .into_iter()
                .map(json_scalar_to_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Payload),
            other => json_scalar_to_value(other).map(|v| Payload(vec![v])),
        }
    }
}

fn json_scalar_to_value(json: JsonValue) -> Result<Value, Error> {
    match json {
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float(f))
            } else {
                Err(Error::InvalidValue)
            }
        }
        JsonValue::String(s) => Ok(Value::Str(s)),
        JsonValue::Bool(b) => Ok(Value::Int(b as i64)),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => Err(Error::InvalidValue),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_json_becomes_single_element_payload() {
        let payload = Payload::try_from(JsonValue::from(180.0)).unwrap();
        assert_eq!(payload.0, vec![Value::Float(180.0)]);
    }

    #[test]
    fn array_json_becomes_multi_element_payload() {
        let payload = Payload::try_from(serde_json::json!([1, "a", 2.5])).unwrap();
        assert_eq!(
            payload.0,
            vec![Value::Int(1), Value::Str("a".into()), Value::Float(2.5)]
        );
    }

    #[test]
    fn null_is_rejected() {
        assert!(matches!(
            Payload::try_from(JsonValue::Null),
            Err(Error::InvalidValue)
        ));
    }

    #[test]
    fn null_inside_array_is_rejected() {
        assert!(matches!(
            Payload::try_from(serde_json::json!([1, null])),
            Err(Error::InvalidValue)
        ));
    }
}

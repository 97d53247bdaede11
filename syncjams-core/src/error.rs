use thiserror::Error;

/// Errors the public engine API can return. Protocol violations observed on
/// the wire are never surfaced this way — they are logged and the offending
/// datagram is dropped (see [`crate::codec::DropReason`]).
#[derive(Error, Debug)]
pub enum Error {
    /// A caller-supplied address did not start with `/`.
    #[error("address must start with '/'")]
    InvalidAddress,
    /// A caller-supplied value could not be converted to a [`crate::Payload`].
    #[error("value is null or contains a null element")]
    InvalidValue,
}

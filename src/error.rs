//! Error taxonomy for the OEF agent client.
//!
//! Every fallible operation in the crate surfaces one of the variants
//! below. Parse and validation failures are raised at construction
//! time and are never retried; socket-level failures close the owning
//! connection and reach the user through the failure callback.

use thiserror::Error;

/// Errors produced by the OEF client stack.
#[derive(Debug, Error)]
pub enum OefError {
    /// TCP dial failed, or a request was made before connect succeeded.
    #[error("connection error: {0}")]
    Connection(String),

    /// The remote peer closed the stream during a receive.
    #[error("end of stream")]
    EndOfStream,

    /// A frame's length prefix exceeds the configured cap.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// The server refused the login handshake.
    #[error("login rejected: {0}")]
    LoginRejected(String),

    /// A frame arrived while the handler chain was not expecting one.
    #[error("message arrived before the connection was complete")]
    PrematureMessage,

    /// The agent public key fails the Base58 alphabet check.
    #[error("invalid agent identity {0:?}: only base58 characters are supported")]
    InvalidIdentity(String),

    /// A query, data model or description violates its invariants.
    #[error("validation error: {0}")]
    Validation(String),

    /// An inbound frame could not be decoded or carries an unknown case.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The scheduler core was used before start, or started twice.
    #[error("core error: {0}")]
    Core(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<prost::DecodeError> for OefError {
    fn from(err: prost::DecodeError) -> Self {
        OefError::Protocol(err.to_string())
    }
}

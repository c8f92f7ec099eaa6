//! Error types for the Servoscope environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Send failed (buffer full, link closed, etc.)
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The remote side refused the connection before it opened
    #[error("Connection rejected: {0}")]
    ConnectionRejected(String),

    /// The link went away (before or after it opened)
    #[error("Connection closed")]
    ConnectionClosed,

    /// Frame serialization/deserialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportError(msg.into())
    }

    /// Creates a rejection error.
    pub fn rejected(reason: impl std::fmt::Display) -> Self {
        Self::ConnectionRejected(reason.to_string())
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

//! Error types for the Servoscope pipeline.
//!
//! Data-shape errors ([`SampleError`], undecodable payloads) are recovered by
//! the router: the event is dropped and processing continues. Programming
//! errors ([`ReconcileError`]) and transport failures propagate.

use servoscope_env::EnvError;
use thiserror::Error;

/// A sample that must never enter a buffer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("Sample time is not finite: {0}")]
    NonFiniteTime(f64),

    #[error("Sample duration must be > 0, got {0}")]
    NonPositiveDuration(f64),

    #[error("Sample channel value is not finite")]
    NonFiniteValue,

    #[error("Position {0} outside [0, 1]")]
    PositionOutOfRange(f64),

    #[error("Channel {channel} outside 1..={count}")]
    ChannelOutOfRange { channel: u32, count: u32 },
}

/// Misuse of the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Selector is not of the form `kind` or `kind.tag`
    #[error("Selector must be of the form \"kind.tag\"; instead got: {0:?}")]
    SelectorMismatch(String),

    /// The same key appeared twice in one keyed call
    #[error("Duplicate key {key:?} under {selector}")]
    DuplicateKey { selector: String, key: String },

    /// Positional and keyed calls addressed the same collection
    #[error("Collection {0} mixes positional and keyed reconciliation")]
    KeyModeConflict(String),
}

/// Failure inside a channel handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Malformed sample: {0}")]
    MalformedSample(#[from] SampleError),

    #[error("Undecodable payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Errors surfaced by the channel router.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Transport failure: {0}")]
    Transport(#[from] EnvError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("Channel {0:?} already has a handler")]
    DuplicateRoute(String),

    /// The session disconnected; no reconnect is attempted
    #[error("Session ended; the router is no longer live")]
    SessionEnded,

    #[error("Router is already {0}")]
    AlreadyStarted(crate::router::ConnectionState),

    #[error("Router is {0}, cannot send")]
    NotLive(crate::router::ConnectionState),
}

/// Invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    /// Creates a validation error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

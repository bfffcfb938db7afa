//! Error types for gatelink.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in gateway operations.
///
/// Only [`GatewayError::Auth`] and [`GatewayError::Config`] ever cross the
/// `connect`/`destroy` boundary. Everything else is recovered inside the
/// session and surfaced as a debug event.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Empty or rejected credential.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Socket closed or failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Frame the session does not understand.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No heartbeat acknowledgement before the watchdog fired.
    #[error("heartbeat ack not received within {0:?}")]
    AckTimeout(Duration),

    /// The server invalidated the session.
    #[error("session invalidated (resumable: {resumable})")]
    SessionInvalidated {
        /// Whether the server allows resuming.
        resumable: bool,
    },

    /// Gateway endpoint lookup failed.
    #[error("endpoint lookup failed: {0}")]
    EndpointLookup(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The session has been destroyed.
    #[error("gateway session closed")]
    Closed,

    /// Frame codec error.
    #[error("codec error: {0}")]
    Codec(#[from] gatelink_proto::ProtoError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Whether the error must stop the session instead of triggering a retry.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Config(_) | Self::Closed)
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

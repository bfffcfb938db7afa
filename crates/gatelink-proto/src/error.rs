//! Error types for the gatelink-proto crate.

use thiserror::Error;

/// Errors that can occur while encoding or decoding gateway frames.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode a frame.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a frame.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Opcode outside the known protocol set.
    #[error("invalid opcode: {0}")]
    InvalidOpcode(u8),

    /// Missing required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Payload did not match the shape expected for its opcode.
    #[error("invalid payload for op {op}: {reason}")]
    InvalidPayload {
        /// Opcode of the offending frame.
        op: u8,
        /// Why the payload was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_opcode_display() {
        let err = ProtoError::InvalidOpcode(42);
        assert_eq!(err.to_string(), "invalid opcode: 42");
    }

    #[test]
    fn test_invalid_payload_display() {
        let err = ProtoError::InvalidPayload {
            op: 10,
            reason: "missing heartbeat_interval".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("op 10"));
        assert!(msg.contains("missing heartbeat_interval"));
    }

    #[test]
    fn test_missing_field_display() {
        let err = ProtoError::MissingField("session_id");
        assert_eq!(err.to_string(), "missing required field: session_id");
    }
}

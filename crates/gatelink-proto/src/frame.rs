//! The frame envelope shared by every gateway message.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtoError;
use crate::opcode::OpCode;
use crate::payloads::{IdentifyPayload, ResumePayload};

/// A single gateway frame: `{op, d, t, s}`.
///
/// `op` is kept as the raw wire byte so that frames with unknown opcodes
/// still decode and can be reported by the session instead of failing here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayFrame {
    /// Raw opcode.
    pub op: u8,
    /// Frame-specific payload.
    #[serde(default)]
    pub d: Value,
    /// Event type, dispatch only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    /// Sequence number, dispatch only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
}

impl GatewayFrame {
    /// Create a frame with the given opcode and payload.
    #[must_use]
    pub fn new(op: OpCode, d: Value) -> Self {
        Self {
            op: op.as_u8(),
            d,
            t: None,
            s: None,
        }
    }

    /// Create a dispatch frame.
    #[must_use]
    pub fn dispatch(event_type: impl Into<String>, sequence: u64, d: Value) -> Self {
        Self {
            op: OpCode::Dispatch.as_u8(),
            d,
            t: Some(event_type.into()),
            s: Some(sequence),
        }
    }

    /// Create a heartbeat carrying the last seen sequence (or null).
    #[must_use]
    pub fn heartbeat(sequence: Option<u64>) -> Self {
        Self::new(OpCode::Heartbeat, sequence.map_or(Value::Null, Value::from))
    }

    /// Create an identify frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn identify(payload: &IdentifyPayload) -> Result<Self, ProtoError> {
        Ok(Self::new(OpCode::Identify, to_value(payload)?))
    }

    /// Create a resume frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn resume(payload: &ResumePayload) -> Result<Self, ProtoError> {
        Ok(Self::new(OpCode::Resume, to_value(payload)?))
    }

    /// Typed opcode, if the raw value is known.
    ///
    /// # Errors
    ///
    /// Returns `ProtoError::InvalidOpcode` for unknown values.
    pub fn opcode(&self) -> Result<OpCode, ProtoError> {
        OpCode::try_from(self.op)
    }

    /// Deserialize the `d` field into a typed payload.
    ///
    /// # Errors
    ///
    /// Returns `ProtoError::InvalidPayload` if the payload has the wrong shape.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtoError> {
        T::deserialize(&self.d).map_err(|e| ProtoError::InvalidPayload {
            op: self.op,
            reason: e.to_string(),
        })
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(|e| ProtoError::Encoding(e.to_string()))
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json(json: &str) -> Result<Self, ProtoError> {
        serde_json::from_str(json).map_err(|e| ProtoError::Decoding(e.to_string()))
    }
}

fn to_value<T: Serialize>(payload: &T) -> Result<Value, ProtoError> {
    serde_json::to_value(payload).map_err(|e| ProtoError::Encoding(e.to_string()))
}

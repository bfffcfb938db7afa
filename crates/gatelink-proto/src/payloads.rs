//! Handshake payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::intents::Intents;

/// Payload of `Hello` (op 10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval: u64,
}

/// Capability descriptor sent inside `Identify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    /// Operating system the client runs on.
    #[serde(rename = "$os")]
    pub os: String,
    /// Client library name.
    #[serde(rename = "$browser")]
    pub browser: String,
    /// Client library name, repeated as the device.
    #[serde(rename = "$device")]
    pub device: String,
}

impl ConnectionProperties {
    /// Build properties for the given platform and client name.
    #[must_use]
    pub fn new(platform: impl Into<String>, client_name: impl Into<String>) -> Self {
        let client_name = client_name.into();
        Self {
            os: platform.into(),
            browser: client_name.clone(),
            device: client_name,
        }
    }
}

/// Payload of `Identify` (op 2).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Authentication credential.
    pub token: String,
    /// Capability descriptor.
    pub properties: ConnectionProperties,
    /// Requested intents.
    pub intents: Intents,
    /// Whether the server may send compressed payloads.
    pub compress: bool,
    /// Member count above which offline members are omitted.
    pub large_threshold: u32,
    /// `[shard_index, shard_count]`.
    pub shard: [u32; 2],
}

impl fmt::Debug for IdentifyPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifyPayload")
            .field("token", &"[redacted]")
            .field("properties", &self.properties)
            .field("intents", &self.intents)
            .field("compress", &self.compress)
            .field("large_threshold", &self.large_threshold)
            .field("shard", &self.shard)
            .finish()
    }
}

/// Payload of `Resume` (op 6).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Authentication credential.
    pub token: String,
    /// Session being resumed.
    pub session_id: String,
    /// Last sequence number received.
    pub seq: Option<u64>,
}

impl fmt::Debug for ResumePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumePayload")
            .field("token", &"[redacted]")
            .field("session_id", &self.session_id)
            .field("seq", &self.seq)
            .finish()
    }
}

/// The fields of the `READY` dispatch the session cares about.
///
/// Everything else in the event is passed through untouched to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyPayload {
    /// Gateway protocol version.
    #[serde(default)]
    pub v: Option<u8>,
    /// Session identifier used for resuming.
    pub session_id: String,
    /// Endpoint to use when resuming this session.
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
    /// Shard pair the session was opened for.
    #[serde(default)]
    pub shard: Option<[u32; 2]>,
}

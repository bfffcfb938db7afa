//! Frame codec seam.
//!
//! The session never touches bytes directly: it hands frames to a
//! [`FrameCodec`] and receives [`WireMessage`]s back. JSON ships with the
//! crate; other encodings plug in through the trait.

use std::borrow::Cow;
use std::fmt;
use std::io::Read;

use flate2::read::{GzDecoder, ZlibDecoder};

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;
use crate::frame::GatewayFrame;

/// Payload encoding negotiated in the connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// JSON text frames.
    #[default]
    Json,
    /// Erlang external term format, binary frames.
    Etf,
}

impl Encoding {
    /// Value used in the `encoding` query parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Etf => "etf",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message as carried by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// Text message.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
}

impl WireMessage {
    /// Raw bytes of the message.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the message is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pack/unpack capability for gateway frames.
pub trait FrameCodec: Send + Sync {
    /// Encoding advertised in the connection URL.
    fn encoding(&self) -> Encoding;

    /// Encode a frame into a wire message.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be encoded.
    fn encode(&self, frame: &GatewayFrame) -> Result<WireMessage, ProtoError>;

    /// Decode a wire message into a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is not a valid frame.
    fn decode(&self, message: &WireMessage) -> Result<GatewayFrame, ProtoError>;
}

/// Inflate a zlib or gzip compressed payload. Anything else is returned as is.
///
/// # Errors
///
/// Returns an error if a compressed payload is corrupt.
pub fn inflate(bytes: &[u8]) -> Result<Cow<'_, [u8]>, ProtoError> {
    let mut inflated = Vec::new();
    let result = match bytes {
        [0x78, ..] => ZlibDecoder::new(bytes).read_to_end(&mut inflated),
        [0x1f, 0x8b, ..] => GzDecoder::new(bytes).read_to_end(&mut inflated),
        _ => return Ok(Cow::Borrowed(bytes)),
    };
    result.map_err(|e| ProtoError::Decoding(format!("failed to inflate payload: {e}")))?;
    Ok(Cow::Owned(inflated))
}

/// JSON codec. Emits text messages, accepts text or binary input.
///
/// Binary input may be zlib or gzip compressed, as the gateway sends when
/// the identify asked for compression.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl FrameCodec for JsonCodec {
    fn encoding(&self) -> Encoding {
        Encoding::Json
    }

    fn encode(&self, frame: &GatewayFrame) -> Result<WireMessage, ProtoError> {
        frame.to_json().map(WireMessage::Text)
    }

    fn decode(&self, message: &WireMessage) -> Result<GatewayFrame, ProtoError> {
        match message {
            WireMessage::Text(text) => GatewayFrame::from_json(text),
            WireMessage::Binary(bytes) => serde_json::from_slice(&inflate(bytes)?)
                .map_err(|e| ProtoError::Decoding(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::{GzEncoder, ZlibEncoder};

    use super::*;
    use crate::opcode::OpCode;

    const ACK: &[u8] = br#"{"op":11,"d":null}"#;

    #[test]
    fn test_encoding_query_value() {
        assert_eq!(Encoding::Json.as_str(), "json");
        assert_eq!(Encoding::Etf.to_string(), "etf");
        assert_eq!(Encoding::default(), Encoding::Json);
    }

    #[test]
    fn test_json_codec_encodes_text() {
        let message = JsonCodec.encode(&GatewayFrame::heartbeat(Some(3))).unwrap();
        assert_eq!(message, WireMessage::Text(r#"{"op":1,"d":3}"#.to_string()));
    }

    #[test]
    fn test_json_codec_decodes_binary() {
        let bytes = br#"{"op":11,"d":null}"#.to_vec();
        let frame = JsonCodec.decode(&WireMessage::Binary(bytes)).unwrap();
        assert_eq!(frame.opcode().unwrap(), OpCode::HeartbeatAck);
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let err = JsonCodec
            .decode(&WireMessage::Binary(vec![0x83, 0x74, 0x00]))
            .unwrap_err();
        assert!(matches!(err, ProtoError::Decoding(_)));
    }

    #[test]
    fn test_json_codec_inflates_zlib_binary() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(ACK).unwrap();
        let compressed = encoder.finish().unwrap();
        assert_ne!(compressed, ACK);

        let frame = JsonCodec.decode(&WireMessage::Binary(compressed)).unwrap();
        assert_eq!(frame.opcode().unwrap(), OpCode::HeartbeatAck);
    }

    #[test]
    fn test_json_codec_inflates_gzip_binary() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(ACK).unwrap();
        let compressed = encoder.finish().unwrap();

        let frame = JsonCodec.decode(&WireMessage::Binary(compressed)).unwrap();
        assert_eq!(frame.opcode().unwrap(), OpCode::HeartbeatAck);
    }

    #[test]
    fn test_corrupt_compressed_binary_rejected() {
        let err = JsonCodec
            .decode(&WireMessage::Binary(vec![0x78, 0x9c, 0xff, 0xff]))
            .unwrap_err();
        match err {
            ProtoError::Decoding(message) => assert!(message.contains("inflate"), "{message}"),
            other => panic!("expected decoding error, got {other:?}"),
        }
    }

    #[test]
    fn test_inflate_passes_plain_bytes_through() {
        assert!(matches!(inflate(ACK).unwrap(), Cow::Borrowed(b) if b == ACK));
    }

    #[test]
    fn test_wire_message_len() {
        assert_eq!(WireMessage::Text("abc".into()).len(), 3);
        assert!(WireMessage::Binary(Vec::new()).is_empty());
    }
}

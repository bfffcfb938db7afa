//! # gatelink-proto
//!
//! Wire vocabulary for the real-time gateway protocol: opcodes, the frame
//! envelope, handshake payloads, close-code semantics and the frame codec
//! seam used by the `gatelink` client.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod close_code;
pub mod codec;
pub mod error;
pub mod frame;
pub mod intents;
pub mod opcode;
pub mod payloads;

pub use close_code::{CloseCode, CloseDisposition};
pub use codec::{Encoding, FrameCodec, JsonCodec, WireMessage};
pub use error::ProtoError;
pub use frame::GatewayFrame;
pub use intents::Intents;
pub use opcode::OpCode;
pub use payloads::{
    ConnectionProperties, HelloPayload, IdentifyPayload, ReadyPayload, ResumePayload,
};

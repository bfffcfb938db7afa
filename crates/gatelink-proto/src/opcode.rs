//! Gateway opcodes.

use std::fmt;

use crate::error::ProtoError;

/// Operation code carried in the `op` field of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// An event was dispatched (receive).
    Dispatch = 0,
    /// Keep-alive (send, occasionally requested by the server).
    Heartbeat = 1,
    /// Start a new session (send).
    Identify = 2,
    /// Update the client's presence (send).
    PresenceUpdate = 3,
    /// Join, move or leave a voice channel (send).
    VoiceStateUpdate = 4,
    /// Resume a previous session (send).
    Resume = 6,
    /// The server asks the client to reconnect and resume (receive).
    Reconnect = 7,
    /// Request guild member chunks (send).
    RequestGuildMembers = 8,
    /// The session has been invalidated (receive).
    InvalidSession = 9,
    /// First frame after connecting, carries the heartbeat interval (receive).
    Hello = 10,
    /// Acknowledgement of a heartbeat (receive).
    HeartbeatAck = 11,
}

impl OpCode {
    /// Raw wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether the client is allowed to send this opcode.
    #[must_use]
    pub const fn is_sendable(self) -> bool {
        matches!(
            self,
            Self::Heartbeat
                | Self::Identify
                | Self::PresenceUpdate
                | Self::VoiceStateUpdate
                | Self::Resume
                | Self::RequestGuildMembers
        )
    }
}

impl TryFrom<u8> for OpCode {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Dispatch),
            1 => Ok(Self::Heartbeat),
            2 => Ok(Self::Identify),
            3 => Ok(Self::PresenceUpdate),
            4 => Ok(Self::VoiceStateUpdate),
            6 => Ok(Self::Resume),
            7 => Ok(Self::Reconnect),
            8 => Ok(Self::RequestGuildMembers),
            9 => Ok(Self::InvalidSession),
            10 => Ok(Self::Hello),
            11 => Ok(Self::HeartbeatAck),
            other => Err(ProtoError::InvalidOpcode(other)),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op.as_u8()
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.as_u8())
    }
}

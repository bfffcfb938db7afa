//! Close-code semantics.
//!
//! Decides what a client must do after the server closes the connection
//! with a given code.

use std::fmt;

/// What the client should do after a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Reconnect and resume the existing session.
    Resume,
    /// Reconnect with a fresh identify; the session is gone.
    Reidentify,
    /// Do not reconnect; the configuration or credential is wrong.
    Fatal,
}

/// A WebSocket close code with gateway-specific meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure. Sent by the client, it invalidates the session.
    pub const NORMAL: Self = Self(1000);
    /// Endpoint going away.
    pub const GOING_AWAY: Self = Self(1001);
    /// Closure that keeps the server-side session alive for a later resume.
    pub const SESSION_PRESERVING: Self = Self(4000);
    /// Unknown error on the server side.
    pub const UNKNOWN_ERROR: Self = Self(4000);
    /// An invalid opcode or payload was sent.
    pub const UNKNOWN_OPCODE: Self = Self(4001);
    /// The server could not decode a payload.
    pub const DECODE_ERROR: Self = Self(4002);
    /// A payload was sent before identifying.
    pub const NOT_AUTHENTICATED: Self = Self(4003);
    /// The credential was rejected.
    pub const AUTHENTICATION_FAILED: Self = Self(4004);
    /// More than one identify was sent.
    pub const ALREADY_AUTHENTICATED: Self = Self(4005);
    /// The sequence sent when resuming was invalid.
    pub const INVALID_SEQUENCE: Self = Self(4007);
    /// Payloads were sent too quickly.
    pub const RATE_LIMITED: Self = Self(4008);
    /// The session timed out.
    pub const SESSION_TIMED_OUT: Self = Self(4009);
    /// Invalid shard pair in identify.
    pub const INVALID_SHARD: Self = Self(4010);
    /// The session would handle too many guilds; sharding is required.
    pub const SHARDING_REQUIRED: Self = Self(4011);
    /// Invalid gateway version.
    pub const INVALID_API_VERSION: Self = Self(4012);
    /// Invalid intents bitmask.
    pub const INVALID_INTENTS: Self = Self(4013);
    /// Intents the client is not approved for.
    pub const DISALLOWED_INTENTS: Self = Self(4014);

    /// Raw code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// What to do after the server closed with this code.
    #[must_use]
    pub const fn disposition(self) -> CloseDisposition {
        match self.0 {
            4004 | 4010 | 4011 | 4012 | 4013 | 4014 => CloseDisposition::Fatal,
            1000 | 4007 | 4009 => CloseDisposition::Reidentify,
            _ => CloseDisposition::Resume,
        }
    }

    /// Short human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self.0 {
            1000 => "normal closure",
            1001 => "going away",
            4000 => "unknown error",
            4001 => "unknown opcode",
            4002 => "decode error",
            4003 => "not authenticated",
            4004 => "authentication failed",
            4005 => "already authenticated",
            4007 => "invalid sequence",
            4008 => "rate limited",
            4009 => "session timed out",
            4010 => "invalid shard",
            4011 => "sharding required",
            4012 => "invalid API version",
            4013 => "invalid intents",
            4014 => "disallowed intents",
            _ => "unrecognized close code",
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(4004, CloseDisposition::Fatal ; "authentication failed")]
    #[test_case(4010, CloseDisposition::Fatal ; "invalid shard")]
    #[test_case(4011, CloseDisposition::Fatal ; "sharding required")]
    #[test_case(4012, CloseDisposition::Fatal ; "invalid version")]
    #[test_case(4013, CloseDisposition::Fatal ; "invalid intents")]
    #[test_case(4014, CloseDisposition::Fatal ; "disallowed intents")]
    #[test_case(1000, CloseDisposition::Reidentify ; "normal closure")]
    #[test_case(4007, CloseDisposition::Reidentify ; "invalid sequence")]
    #[test_case(4009, CloseDisposition::Reidentify ; "session timed out")]
    #[test_case(1001, CloseDisposition::Resume ; "going away")]
    #[test_case(1006, CloseDisposition::Resume ; "abnormal closure")]
    #[test_case(4000, CloseDisposition::Resume ; "unknown error")]
    #[test_case(4008, CloseDisposition::Resume ; "rate limited")]
    fn test_disposition(code: u16, expected: CloseDisposition) {
        assert_eq!(CloseCode::from(code).disposition(), expected);
    }

    #[test]
    fn test_display_includes_description() {
        assert_eq!(
            CloseCode::AUTHENTICATION_FAILED.to_string(),
            "4004 (authentication failed)"
        );
        assert_eq!(CloseCode(4242).description(), "unrecognized close code");
    }

    #[test]
    fn test_session_preserving_is_resumable() {
        assert_ne!(CloseCode::SESSION_PRESERVING, CloseCode::NORMAL);
        assert_eq!(
            CloseCode::SESSION_PRESERVING.disposition(),
            CloseDisposition::Resume
        );
    }
}

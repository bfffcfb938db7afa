//! Connection state types.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// State of the gateway session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport.
    Disconnected,
    /// Resolving the endpoint or opening the transport.
    Connecting,
    /// Transport open, waiting for `Hello`.
    AwaitingHello,
    /// `Identify` submitted, waiting for `READY`.
    Identifying,
    /// `Resume` submitted, waiting for `RESUMED`.
    Resuming,
    /// Session established, dispatches flowing.
    Ready,
    /// Destroyed or terminated; the session will not reconnect.
    Destroyed,
}

impl ConnectionState {
    /// Whether a transport is attached in this state.
    #[must_use]
    pub const fn has_transport(self) -> bool {
        matches!(
            self,
            Self::AwaitingHello | Self::Identifying | Self::Resuming | Self::Ready
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting-hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Ready => "ready",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Atomic wrapper for connection state, shared between the session and its handle.
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU32);

impl AtomicConnectionState {
    /// Create a new atomic state.
    #[must_use]
    pub const fn new(state: ConnectionState) -> Self {
        Self(AtomicU32::new(state as u32))
    }

    /// Load the current state.
    #[must_use]
    pub fn load(&self) -> ConnectionState {
        match self.0.load(Ordering::SeqCst) {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::AwaitingHello,
            3 => ConnectionState::Identifying,
            4 => ConnectionState::Resuming,
            5 => ConnectionState::Ready,
            _ => ConnectionState::Destroyed,
        }
    }

    /// Store a new state.
    pub fn store(&self, state: ConnectionState) {
        self.0.store(state as u32, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_enum() {
        assert_eq!(ConnectionState::Disconnected as u32, 0);
        assert_eq!(ConnectionState::Connecting as u32, 1);
        assert_eq!(ConnectionState::AwaitingHello as u32, 2);
        assert_eq!(ConnectionState::Identifying as u32, 3);
        assert_eq!(ConnectionState::Resuming as u32, 4);
        assert_eq!(ConnectionState::Ready as u32, 5);
        assert_eq!(ConnectionState::Destroyed as u32, 6);
    }

    #[test]
    fn test_atomic_connection_state() {
        let state = AtomicConnectionState::new(ConnectionState::Disconnected);
        assert_eq!(state.load(), ConnectionState::Disconnected);

        for next in [
            ConnectionState::Connecting,
            ConnectionState::AwaitingHello,
            ConnectionState::Identifying,
            ConnectionState::Resuming,
            ConnectionState::Ready,
            ConnectionState::Destroyed,
        ] {
            state.store(next);
            assert_eq!(state.load(), next);
        }
    }

    #[test]
    fn test_has_transport() {
        assert!(!ConnectionState::Disconnected.has_transport());
        assert!(!ConnectionState::Connecting.has_transport());
        assert!(ConnectionState::AwaitingHello.has_transport());
        assert!(ConnectionState::Ready.has_transport());
        assert!(!ConnectionState::Destroyed.has_transport());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::AwaitingHello.to_string(), "awaiting-hello");
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
    }
}

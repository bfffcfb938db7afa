//! Caller-side handle to a running gateway session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use gatelink_proto::OpCode;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::ShardInfo;
use crate::error::{GatewayError, GatewayResult};
use crate::send_manager::OutboundIntent;
use crate::state::{AtomicConnectionState, ConnectionState};

const NO_LATENCY: u64 = u64::MAX;

/// Request from a handle to its session actor.
#[derive(Debug)]
pub(crate) enum Command {
    /// Submit an intent to the send manager.
    Send(OutboundIntent),
    /// Close and stop.
    Destroy {
        /// Normal closure (true) or session-preserving closure (false).
        graceful: bool,
    },
}

/// State shared between a session actor and its handles.
#[derive(Debug)]
pub(crate) struct SessionShared {
    pub(crate) state: AtomicConnectionState,
    pub(crate) running: AtomicBool,
    latency_ms: AtomicU64,
}

impl SessionShared {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicConnectionState::new(ConnectionState::Disconnected),
            running: AtomicBool::new(true),
            latency_ms: AtomicU64::new(NO_LATENCY),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(NO_LATENCY - 1);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    pub(crate) fn latency(&self) -> Option<Duration> {
        match self.latency_ms.load(Ordering::SeqCst) {
            NO_LATENCY => None,
            millis => Some(Duration::from_millis(millis)),
        }
    }
}

/// Handle to one gateway session.
///
/// Cheap to clone. The session stops when [`destroy`](Self::destroy) is
/// called or when every handle has been dropped.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    shared: Arc<SessionShared>,
    commands: mpsc::UnboundedSender<Command>,
    shard: ShardInfo,
}

impl GatewayHandle {
    pub(crate) fn new(
        shared: Arc<SessionShared>,
        commands: mpsc::UnboundedSender<Command>,
        shard: ShardInfo,
    ) -> Self {
        Self {
            shared,
            commands,
            shard,
        }
    }

    /// Queue a frame for sending.
    ///
    /// Frames sent before the session is ready are buffered and released in
    /// order once it is, under the outbound rate budget.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Closed`] after the session was destroyed, and
    /// [`GatewayError::Protocol`] for opcodes clients cannot send and for the
    /// handshake opcodes the session manages.
    pub fn send(&self, opcode: OpCode, payload: Value) -> GatewayResult<()> {
        if !opcode.is_sendable() {
            return Err(GatewayError::Protocol(format!(
                "{opcode} cannot be sent by a client"
            )));
        }
        if matches!(opcode, OpCode::Identify | OpCode::Resume) {
            return Err(GatewayError::Protocol(format!(
                "{opcode} is sent by the session itself"
            )));
        }
        if !self.shared.is_running() {
            return Err(GatewayError::Closed);
        }
        let intent = match opcode {
            OpCode::Heartbeat => OutboundIntent::Heartbeat,
            _ => OutboundIntent::Event { opcode, payload },
        };
        self.commands
            .send(Command::Send(intent))
            .map_err(|_| GatewayError::Closed)
    }

    /// Stop the session.
    ///
    /// Takes effect immediately: no timer or transport event is handled
    /// afterwards. `graceful` closes with a normal closure, which ends the
    /// server-side session; otherwise the close preserves it for a later
    /// resume.
    pub fn destroy(&self, graceful: bool) {
        self.shared.stop();
        // The actor may already have exited on its own.
        let _ = self.commands.send(Command::Destroy { graceful });
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    /// Round trip of the last acknowledged heartbeat.
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.shared.latency()
    }

    /// Shard this session serves.
    #[must_use]
    pub const fn shard(&self) -> ShardInfo {
        self.shard
    }

    /// Whether the session has not been destroyed or terminated.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Wait until the session actor has exited.
    pub async fn closed(&self) {
        self.commands.closed().await;
    }
}

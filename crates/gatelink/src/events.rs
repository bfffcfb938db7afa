//! Gateway event types and the sink they are published to.

use std::time::Duration;

use gatelink_proto::GatewayFrame;
use serde_json::Value;
use tokio::sync::mpsc;

/// Events published by a gateway session.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// Every decoded inbound frame, before it is handled.
    Raw(GatewayFrame),
    /// Diagnostic message, including every recovered error.
    Debug(String),
    /// Round trip of the last heartbeat.
    Ping(Duration),
    /// A dispatched event.
    Dispatch {
        /// Event type, e.g. `MESSAGE_CREATE`.
        event_type: String,
        /// Sequence number of the frame.
        sequence: Option<u64>,
        /// Event payload.
        payload: Value,
    },
    /// The transport went away. A reconnect follows unless `Terminated` does.
    Disconnected {
        /// Close code, if the peer sent one.
        code: Option<u16>,
        /// Reason for disconnection.
        reason: String,
    },
    /// A new transport is about to be opened.
    Reconnecting {
        /// Consecutive attempt number.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
        /// Whether the next handshake resumes the session.
        resume: bool,
    },
    /// The session stopped for good.
    Terminated {
        /// Why the session stopped.
        reason: String,
    },
}

impl GatewayEvent {
    /// Event type name for dispatches.
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        match self {
            Self::Dispatch { event_type, .. } => Some(event_type),
            _ => None,
        }
    }

    /// Whether this is the last event the session will publish.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated { .. })
    }
}

/// Receiver of everything a session publishes.
pub trait EventSink: Send + 'static {
    /// Deliver one event. Must not block.
    fn publish(&mut self, event: GatewayEvent);
}

impl EventSink for mpsc::UnboundedSender<GatewayEvent> {
    fn publish(&mut self, event: GatewayEvent) {
        // A dropped receiver means nobody is listening; the session keeps running.
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_event_type() {
        let event = GatewayEvent::Dispatch {
            event_type: "READY".to_string(),
            sequence: Some(1),
            payload: json!({"session_id": "abc"}),
        };
        assert_eq!(event.event_type(), Some("READY"));
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_non_dispatch_has_no_event_type() {
        assert_eq!(GatewayEvent::Ping(Duration::from_millis(50)).event_type(), None);
        assert_eq!(GatewayEvent::Debug("x".into()).event_type(), None);
    }

    #[test]
    fn test_terminated_is_terminal() {
        let event = GatewayEvent::Terminated {
            reason: "destroyed".to_string(),
        };
        assert!(event.is_terminal());
    }

    #[test]
    fn test_reconnecting_fields() {
        let event = GatewayEvent::Reconnecting {
            attempt: 3,
            delay: Duration::from_secs(4),
            resume: true,
        };
        if let GatewayEvent::Reconnecting {
            attempt,
            delay,
            resume,
        } = event
        {
            assert_eq!(attempt, 3);
            assert_eq!(delay, Duration::from_secs(4));
            assert!(resume);
        } else {
            panic!("expected Reconnecting");
        }
    }

    #[test]
    fn test_channel_sink_delivers() {
        let (mut tx, mut rx) = mpsc::unbounded_channel();
        tx.publish(GatewayEvent::Debug("hello".to_string()));
        assert_eq!(
            rx.try_recv().unwrap(),
            GatewayEvent::Debug("hello".to_string())
        );
    }

    #[test]
    fn test_channel_sink_tolerates_dropped_receiver() {
        let (mut tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.publish(GatewayEvent::Debug("nobody home".to_string()));
    }
}

//! Duplex message transport.
//!
//! A [`Connector`] opens one connection and hands back a [`TransportHandle`]:
//! a command sender for outbound frames and close requests, and a receiver of
//! inbound messages terminated by exactly one `Closed` or `Error` event.
//! Dropping the handle detaches the session from the connection; nothing it
//! delivers afterwards can reach the session.

use std::future::Future;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use gatelink_proto::WireMessage;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};

/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request from the session to its transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Write one message.
    Send(WireMessage),
    /// Close with the given code. Nothing is written afterwards.
    Close(u16),
}

/// Notification from a transport to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound message.
    Message(WireMessage),
    /// The connection closed.
    Closed {
        /// Close code, if a close frame was received.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
    /// The connection failed without a close frame.
    Error(String),
}

impl TransportEvent {
    /// Whether no further events follow.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed { .. } | Self::Error(_))
    }
}

/// An open connection as seen by the session.
#[derive(Debug)]
pub struct TransportHandle {
    /// Outbound commands.
    pub outbound: mpsc::UnboundedSender<TransportCommand>,
    /// Inbound events.
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportHandle {
    /// Queue a message for writing.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer has already gone away.
    pub fn send(&self, message: WireMessage) -> GatewayResult<()> {
        self.outbound
            .send(TransportCommand::Send(message))
            .map_err(|_| GatewayError::Transport("transport writer closed".to_string()))
    }

    /// Ask the transport to close with `code`, consuming the handle.
    pub fn close(self, code: u16) {
        // The writer may already be gone if the peer closed first.
        let _ = self.outbound.send(TransportCommand::Close(code));
    }
}

/// Opens transports.
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `url`. The returned handle is already open.
    fn connect(&self, url: &str) -> impl Future<Output = GatewayResult<TransportHandle>> + Send;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketConnector {
    /// Connector with the default handshake timeout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the handshake timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Configured handshake timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    async fn reader_task(mut read: SplitStream<WsStream>, tx: mpsc::UnboundedSender<TransportEvent>) {
        let mut close: Option<(Option<u16>, String)> = None;
        let terminal = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let message = WireMessage::Text(text.to_string());
                    if tx.send(TransportEvent::Message(message)).is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    let message = WireMessage::Binary(data.to_vec());
                    if tx.send(TransportEvent::Message(message)).is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    // Keep reading so the library can complete the closing handshake.
                    close = Some(frame.map_or_else(
                        || (None, String::new()),
                        |f| (Some(u16::from(f.code)), f.reason.to_string()),
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    break match close.take() {
                        Some((code, reason)) => TransportEvent::Closed { code, reason },
                        None => TransportEvent::Error(e.to_string()),
                    };
                }
                None => {
                    let (code, reason) = close
                        .take()
                        .unwrap_or_else(|| (None, "connection closed".to_string()));
                    break TransportEvent::Closed { code, reason };
                }
            }
        };
        debug!(event = ?terminal, "websocket reader finished");
        let _ = tx.send(terminal);
    }

    async fn writer_task(
        mut write: SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<TransportCommand>,
    ) {
        while let Some(command) = rx.recv().await {
            match command {
                TransportCommand::Send(WireMessage::Text(text)) => {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                TransportCommand::Send(WireMessage::Binary(data)) => {
                    if write.send(Message::Binary(data.into())).await.is_err() {
                        break;
                    }
                }
                TransportCommand::Close(code) => {
                    let frame = CloseFrame {
                        code: WsCloseCode::from(code),
                        reason: "".into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, code, "failed to send close frame");
                    }
                    break;
                }
            }
        }
    }
}

impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> GatewayResult<TransportHandle> {
        let (ws_stream, _) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| {
                    GatewayError::Transport(format!(
                        "connect timed out after {:?}",
                        self.connect_timeout
                    ))
                })?
                .map_err(|e| GatewayError::Transport(format!("failed to connect: {e}")))?;

        let (write, read) = ws_stream.split();
        let (outbound, commands) = mpsc::unbounded_channel();
        let (events, inbound) = mpsc::unbounded_channel();

        tokio::spawn(Self::reader_task(read, events));
        tokio::spawn(Self::writer_task(write, commands));

        Ok(TransportHandle { outbound, inbound })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(TransportEvent::Error("reset".into()).is_terminal());
        assert!(
            TransportEvent::Closed {
                code: Some(4000),
                reason: String::new()
            }
            .is_terminal()
        );
        assert!(!TransportEvent::Message(WireMessage::Text("{}".into())).is_terminal());
    }

    #[test]
    fn test_handle_send_and_close() {
        let (outbound, mut commands) = mpsc::unbounded_channel();
        let (_events, inbound) = mpsc::unbounded_channel();
        let handle = TransportHandle { outbound, inbound };

        handle
            .send(WireMessage::Text("{\"op\":1}".into()))
            .expect("writer alive");
        handle.close(4000);

        assert_eq!(
            commands.try_recv().unwrap(),
            TransportCommand::Send(WireMessage::Text("{\"op\":1}".into()))
        );
        assert_eq!(commands.try_recv().unwrap(), TransportCommand::Close(4000));
    }

    #[test]
    fn test_send_after_writer_gone() {
        let (outbound, commands) = mpsc::unbounded_channel();
        let (_events, inbound) = mpsc::unbounded_channel();
        drop(commands);
        let handle = TransportHandle { outbound, inbound };

        let result = handle.send(WireMessage::Text("{}".into()));
        assert!(matches!(result, Err(GatewayError::Transport(_))));
    }

    #[test]
    fn test_connector_timeout_setting() {
        let connector = WebSocketConnector::new().with_connect_timeout(Duration::from_secs(2));
        assert_eq!(connector.connect_timeout(), Duration::from_secs(2));
        assert_eq!(
            WebSocketConnector::default().connect_timeout(),
            DEFAULT_CONNECT_TIMEOUT
        );
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let result = WebSocketConnector::new()
            .connect(&format!("ws://{addr}"))
            .await;
        assert!(matches!(result, Err(GatewayError::Transport(_))));
    }
}

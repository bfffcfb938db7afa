//! # gatelink
//!
//! Client for a persistent real-time gateway: one long-lived streaming
//! connection per shard that receives dispatched events, proves liveness
//! with heartbeats, and survives network failures by resuming the
//! server-side session whenever it can.
//!
//! A [`GatewayClient`] spawns one session actor per [`connect`](GatewayClient::connect)
//! call. The actor owns the transport, the outbound [`SendManager`] and every
//! timer; callers talk to it through a [`GatewayHandle`] and observe it
//! through an [`EventSink`].
//!
//! ```no_run
//! use gatelink::{GatewayClient, GatewayConfig, GatewayEvent};
//!
//! # async fn run() -> gatelink::GatewayResult<()> {
//! let client = GatewayClient::new(GatewayConfig::default())?;
//! let (handle, mut events) = client.connect_channel("token")?;
//! while let Some(event) = events.recv().await {
//!     if let GatewayEvent::Dispatch { event_type, .. } = &event {
//!         println!("{event_type}");
//!     }
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! handle.destroy(true);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod events;
mod gateway;
pub mod handle;
pub mod heartbeat;
pub mod rate_limit;
pub mod reconnect;
pub mod send_manager;
pub mod session;
pub mod state;
pub mod transport;

pub use client::GatewayClient;
pub use config::{GatewayConfig, HeartbeatSettings, ShardInfo};
pub use endpoint::{
    EndpointResolver, GatewayBotInfo, HttpEndpointResolver, SessionStartLimit, StaticEndpoint,
    build_gateway_url,
};
pub use error::{GatewayError, GatewayResult};
pub use events::{EventSink, GatewayEvent};
pub use gateway::{READY_EVENT, RESUMED_EVENT};
pub use handle::GatewayHandle;
pub use heartbeat::Heartbeater;
pub use rate_limit::{RateBudget, RateLimitConfig, SlidingWindow};
pub use reconnect::{Backoff, ReconnectConfig, calculate_backoff};
pub use send_manager::{IntentClass, LinkPhase, OutboundIntent, SendManager};
pub use session::SessionRecord;
pub use state::{AtomicConnectionState, ConnectionState};
pub use transport::{
    Connector, TransportCommand, TransportEvent, TransportHandle, WebSocketConnector,
};

pub use gatelink_proto as proto;

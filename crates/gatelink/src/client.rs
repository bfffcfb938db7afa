//! Gateway client: builds and spawns session actors.

use std::fmt;
use std::sync::Arc;

use gatelink_proto::{FrameCodec, JsonCodec};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::GatewayConfig;
use crate::endpoint::{EndpointResolver, HttpEndpointResolver};
use crate::error::{GatewayError, GatewayResult};
use crate::events::{EventSink, GatewayEvent};
use crate::gateway::GatewaySession;
use crate::handle::{GatewayHandle, SessionShared};
use crate::transport::{Connector, WebSocketConnector};

/// Gateway client.
///
/// Holds configuration and the collaborators every session needs. Each
/// [`connect`](Self::connect) spawns an independent session actor; a client
/// can start one session per shard.
pub struct GatewayClient<C = WebSocketConnector, R = HttpEndpointResolver> {
    config: GatewayConfig,
    connector: C,
    resolver: R,
    codec: Arc<dyn FrameCodec>,
}

impl<C: fmt::Debug, R: fmt::Debug> fmt::Debug for GatewayClient<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("config", &self.config)
            .field("connector", &self.connector)
            .field("resolver", &self.resolver)
            .field("encoding", &self.codec.encoding())
            .finish()
    }
}

impl GatewayClient {
    /// Create a client using WebSockets and HTTP endpoint lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let resolver = HttpEndpointResolver::new(&config.api_base_url)?;
        Ok(Self {
            config,
            connector: WebSocketConnector::new(),
            resolver,
            codec: Arc::new(JsonCodec),
        })
    }
}

impl<C, R> GatewayClient<C, R> {
    /// Replace the transport connector.
    #[must_use]
    pub fn with_connector<C2>(self, connector: C2) -> GatewayClient<C2, R> {
        GatewayClient {
            config: self.config,
            connector,
            resolver: self.resolver,
            codec: self.codec,
        }
    }

    /// Replace the endpoint resolver.
    #[must_use]
    pub fn with_resolver<R2>(self, resolver: R2) -> GatewayClient<C, R2> {
        GatewayClient {
            config: self.config,
            connector: self.connector,
            resolver,
            codec: self.codec,
        }
    }

    /// Replace the frame codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn FrameCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Client configuration.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

impl<C, R> GatewayClient<C, R>
where
    C: Connector + Clone,
    R: EndpointResolver + Clone,
{
    /// Start a session authenticated with `credential`, publishing to `sink`.
    ///
    /// Returns as soon as the session actor is spawned; progress is reported
    /// through the sink.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Auth`] if the credential is empty and
    /// [`GatewayError::Config`] if the configuration is invalid, names an
    /// encoding the codec does not speak, or no tokio runtime is running.
    pub fn connect(
        &self,
        credential: impl Into<String>,
        sink: impl EventSink,
    ) -> GatewayResult<GatewayHandle> {
        let credential = credential.into();
        if credential.trim().is_empty() {
            return Err(GatewayError::Auth("credential is empty".to_string()));
        }
        self.config.validate()?;
        if self.config.encoding != self.codec.encoding() {
            return Err(GatewayError::Config(format!(
                "encoding {} requires a matching codec, installed codec speaks {}",
                self.config.encoding,
                self.codec.encoding()
            )));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| GatewayError::Config(format!("connect requires a tokio runtime: {e}")))?;

        let shared = Arc::new(SessionShared::new());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let session = GatewaySession::new(
            Arc::new(self.config.clone()),
            credential,
            self.connector.clone(),
            self.resolver.clone(),
            Arc::clone(&self.codec),
            sink,
            Arc::clone(&shared),
            commands_rx,
        );

        info!(
            shard = self.config.shard.index,
            shard_count = self.config.shard.count,
            "spawning gateway session"
        );
        runtime.spawn(session.run());

        Ok(GatewayHandle::new(shared, commands_tx, self.config.shard))
    }

    /// Start a session whose events are delivered over an unbounded channel.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub fn connect_channel(
        &self,
        credential: impl Into<String>,
    ) -> GatewayResult<(GatewayHandle, mpsc::UnboundedReceiver<GatewayEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.connect(credential, tx)?;
        Ok((handle, rx))
    }
}

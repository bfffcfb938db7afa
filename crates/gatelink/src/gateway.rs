//! The gateway session actor.
//!
//! One task per session owns the transport, the send manager, the session
//! record and every timer. Transport events, handle commands and timers are
//! multiplexed in a single `select!` loop, so session state is only ever
//! touched from one place and needs no locking. Stopping the actor drops the
//! transport and every timer with it.

use std::sync::Arc;
use std::time::Duration;

use gatelink_proto::{
    CloseCode, CloseDisposition, FrameCodec, GatewayFrame, HelloPayload, IdentifyPayload, OpCode,
    ReadyPayload,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::endpoint::{EndpointResolver, build_gateway_url};
use crate::error::{GatewayError, GatewayResult};
use crate::events::{EventSink, GatewayEvent};
use crate::handle::{Command, SessionShared};
use crate::heartbeat::{Heartbeater, sleep_until_some};
use crate::reconnect::Backoff;
use crate::send_manager::{IntentClass, OutboundIntent, SendManager};
use crate::session::SessionRecord;
use crate::state::ConnectionState;
use crate::transport::{Connector, TransportEvent, TransportHandle};

/// Dispatch type that establishes a session.
pub const READY_EVENT: &str = "READY";
/// Dispatch type that confirms a resume.
pub const RESUMED_EVENT: &str = "RESUMED";

/// Everything a session actor owns.
pub(crate) struct GatewaySession<C, R, S> {
    config: Arc<GatewayConfig>,
    credential: String,
    connector: C,
    resolver: R,
    codec: Arc<dyn FrameCodec>,
    sink: S,
    shared: Arc<SessionShared>,
    commands: mpsc::UnboundedReceiver<Command>,
    record: SessionRecord,
    send_manager: SendManager,
    heartbeat: Heartbeater,
    transport: Option<TransportHandle>,
    gateway_url: Option<String>,
    reconnect_at: Option<Instant>,
    identify_retry_at: Option<Instant>,
    backoff: Backoff,
    finished: bool,
}

impl<C, R, S> GatewaySession<C, R, S>
where
    C: Connector,
    R: EndpointResolver,
    S: EventSink,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: Arc<GatewayConfig>,
        credential: String,
        connector: C,
        resolver: R,
        codec: Arc<dyn FrameCodec>,
        sink: S,
        shared: Arc<SessionShared>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let record = SessionRecord::new(config.shard);
        let send_manager = SendManager::new(&config.rate_limit);
        let heartbeat = Heartbeater::new(config.heartbeat.ack_timeout());
        let backoff = Backoff::new(config.reconnect.clone());
        Self {
            config,
            credential,
            connector,
            resolver,
            codec,
            sink,
            shared,
            commands,
            record,
            send_manager,
            heartbeat,
            transport: None,
            gateway_url: None,
            reconnect_at: None,
            identify_retry_at: None,
            backoff,
            finished: false,
        }
    }

    /// Run until destroyed or terminated.
    pub(crate) async fn run(mut self) {
        let shard = self.config.shard;
        info!(shard = shard.index, shard_count = shard.count, "gateway session starting");
        self.reconnect_at = Some(Instant::now());

        while !self.finished {
            let send_deadline = self.send_manager.next_deadline(Instant::now());
            let ack_deadline = self.heartbeat.ack_deadline();
            let identify_retry_at = self.identify_retry_at;
            let reconnect_at = self.reconnect_at;

            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Send(intent)) => self.send_manager.submit(intent),
                    Some(Command::Destroy { graceful }) => self.shutdown(graceful),
                    None => self.shutdown(true),
                },
                event = next_transport_event(&mut self.transport) => self.on_transport_event(event),
                () = sleep_until_some(ack_deadline) => self.on_ack_timeout(),
                _ = self.heartbeat.tick() => self.send_manager.submit(OutboundIntent::Heartbeat),
                () = sleep_until_some(identify_retry_at) => self.on_identify_retry(),
                () = sleep_until_some(reconnect_at) => self.open_transport().await,
                () = sleep_until_some(send_deadline) => {}
            }

            if !self.finished {
                self.flush_outbound();
            }
        }

        self.shared.state.store(ConnectionState::Destroyed);
        info!(shard = shard.index, "gateway session stopped");
    }

    fn publish(&mut self, event: GatewayEvent) {
        self.sink.publish(event);
    }

    fn publish_debug(&mut self, message: impl Into<String>) {
        self.sink.publish(GatewayEvent::Debug(message.into()));
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.shared.state.load();
        if previous != state {
            debug!(from = %previous, to = %state, "connection state changed");
            self.shared.state.store(state);
        }
    }

    /// Hand every eligible intent to the transport.
    fn flush_outbound(&mut self) {
        let now = Instant::now();
        while let Some(intent) = self.send_manager.poll_next(now) {
            if !self.transmit(intent, now) {
                break;
            }
        }
    }

    /// Returns `false` once the transport stops accepting frames.
    fn transmit(&mut self, intent: OutboundIntent, now: Instant) -> bool {
        let Some(transport) = self.transport.as_ref() else {
            self.send_manager.requeue(intent);
            return false;
        };
        let opcode = intent.opcode();
        let is_heartbeat = matches!(intent, OutboundIntent::Heartbeat);
        let retry = (intent.class() == IntentClass::Event).then(|| intent.clone());

        let message = match intent
            .into_frame(self.record.sequence)
            .and_then(|frame| self.codec.encode(&frame))
        {
            Ok(message) => message,
            Err(e) => {
                warn!(op = %opcode, error = %e, "failed to encode outbound frame");
                self.publish_debug(format!("dropped outbound {opcode}: {e}"));
                return true;
            }
        };

        if let Err(e) = transport.send(message) {
            // The reader reports the close shortly.
            debug!(op = %opcode, error = %e, "transport rejected frame");
            if let Some(intent) = retry {
                self.send_manager.requeue(intent);
            }
            return false;
        }

        if is_heartbeat {
            self.record.heartbeat_sent(now);
            self.heartbeat.arm_watchdog(now);
            debug!(seq = ?self.record.sequence, "heartbeat sent");
        } else {
            debug!(op = %opcode, "frame sent");
        }
        true
    }

    async fn open_transport(&mut self) {
        self.reconnect_at = None;
        if !self.shared.is_running() {
            return;
        }
        self.set_state(ConnectionState::Connecting);

        let base = match self.endpoint_base().await {
            Ok(base) => base,
            Err(e) => {
                self.on_connect_failure(e);
                return;
            }
        };

        let url = match build_gateway_url(&base, self.config.version, self.codec.encoding()) {
            Ok(url) => url,
            Err(e) => {
                self.on_connect_failure(e);
                return;
            }
        };

        debug!(url = %url, attempt = self.backoff.next_attempt(), "opening transport");
        match self.connector.connect(url.as_str()).await {
            Ok(transport) => {
                if !self.shared.is_running() {
                    transport.close(CloseCode::NORMAL.as_u16());
                    return;
                }
                info!(url = %url, shard = self.config.shard.index, "transport open");
                self.publish_debug(format!("connected to {url}"));
                self.transport = Some(transport);
                self.send_manager.attach();
                self.set_state(ConnectionState::AwaitingHello);
            }
            Err(e) => self.on_connect_failure(e),
        }
    }

    /// Base URL for the next connection: the resume endpoint when resuming,
    /// otherwise the looked-up gateway URL.
    async fn endpoint_base(&mut self) -> GatewayResult<String> {
        if self.record.can_resume() {
            if let Some(url) = &self.record.resume_url {
                return Ok(url.clone());
            }
        }
        if let Some(url) = &self.gateway_url {
            return Ok(url.clone());
        }
        let info = self.resolver.resolve(&self.credential).await?;
        if let Some(shards) = info.shards {
            debug!(recommended_shards = shards, "endpoint resolved");
        }
        self.gateway_url = Some(info.url.clone());
        Ok(info.url)
    }

    fn on_connect_failure(&mut self, err: GatewayError) {
        self.backoff.record_failure();
        if err.is_fatal() {
            error!(error = %err, "cannot connect");
            self.terminate(err.to_string());
            return;
        }
        debug!(error = %err, attempt = self.backoff.failures(), "connection attempt failed");
        self.publish_debug(err.to_string());
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        self.set_state(ConnectionState::Disconnected);
        let Some(delay) = self.backoff.next_delay() else {
            let failures = self.backoff.failures();
            error!(attempts = failures, "reconnect attempts exhausted");
            self.terminate(format!("giving up after {failures} failed attempts"));
            return;
        };

        let attempt = self.backoff.next_attempt();
        let resume = self.record.can_resume();
        info!(attempt, ?delay, resume, "reconnecting");
        self.publish(GatewayEvent::Reconnecting {
            attempt,
            delay,
            resume,
        });
        self.reconnect_at = Some(Instant::now() + delay);
    }

    /// Tear down everything bound to the current connection.
    fn drop_transport(&mut self, close_code: Option<CloseCode>) {
        self.heartbeat.stop();
        self.identify_retry_at = None;
        self.record.connection_lost();
        if let Some(transport) = self.transport.take() {
            if let Some(code) = close_code {
                transport.close(code.as_u16());
            }
        }
        let discarded = self.send_manager.detach();
        if discarded > 0 {
            debug!(discarded, "discarded connection-bound frames");
        }
    }

    fn on_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Message(message)) => match self.codec.decode(&message) {
                Ok(frame) => {
                    if self.config.emit_raw {
                        self.publish(GatewayEvent::Raw(frame.clone()));
                    }
                    self.handle_frame(frame);
                }
                Err(e) => {
                    warn!(error = %e, "failed to decode inbound frame");
                    self.publish_debug(GatewayError::from(e).to_string());
                }
            },
            Some(TransportEvent::Closed { code, reason }) => self.on_transport_closed(code, reason),
            Some(TransportEvent::Error(e)) => {
                self.publish_debug(GatewayError::Transport(e.clone()).to_string());
                self.on_transport_closed(None, e);
            }
            None => self.on_transport_closed(None, "transport ended".to_string()),
        }
    }

    fn on_transport_closed(&mut self, code: Option<u16>, reason: String) {
        let was_ready = self.shared.state.load() == ConnectionState::Ready;
        self.drop_transport(None);
        debug!(code, reason = %reason, "transport closed");
        self.publish(GatewayEvent::Disconnected {
            code,
            reason: reason.clone(),
        });

        if let Some(code) = code.map(CloseCode::from) {
            self.publish_debug(format!("connection closed with {code}"));
            match code.disposition() {
                CloseDisposition::Fatal => {
                    error!(code = code.as_u16(), "gateway closed with a fatal code");
                    self.terminate(format!("closed with {code}"));
                    return;
                }
                CloseDisposition::Reidentify => {
                    info!(code = code.as_u16(), "session cannot be resumed");
                    self.record.clear_session();
                }
                CloseDisposition::Resume => {}
            }
        } else {
            self.publish_debug(format!("connection lost: {reason}"));
        }

        if !was_ready {
            self.backoff.record_failure();
        }
        self.schedule_reconnect();
    }

    fn handle_frame(&mut self, frame: GatewayFrame) {
        let opcode = match frame.opcode() {
            Ok(opcode) => opcode,
            Err(e) => {
                warn!(op = frame.op, "ignoring frame with unknown opcode");
                self.publish_debug(GatewayError::Protocol(e.to_string()).to_string());
                return;
            }
        };

        match opcode {
            OpCode::Dispatch => self.on_dispatch(frame),
            OpCode::Hello => self.on_hello(&frame),
            OpCode::HeartbeatAck => self.on_heartbeat_ack(),
            OpCode::Heartbeat => {
                debug!("server requested a heartbeat");
                self.send_manager.submit(OutboundIntent::Heartbeat);
            }
            OpCode::Reconnect => self.on_reconnect_request(),
            OpCode::InvalidSession => self.on_invalid_session(&frame),
            other => {
                warn!(op = %other, "ignoring client-only opcode from server");
                self.publish_debug(
                    GatewayError::Protocol(format!("unexpected {other} from server")).to_string(),
                );
            }
        }
    }

    fn on_dispatch(&mut self, frame: GatewayFrame) {
        if let Some(sequence) = frame.s {
            self.record.observe_sequence(sequence);
        }
        let event_type = frame.t.clone().unwrap_or_default();

        match event_type.as_str() {
            READY_EVENT => match frame.payload::<ReadyPayload>() {
                Ok(ready) => {
                    self.record.capture_ready(&ready);
                    info!(
                        session_id = %ready.session_id,
                        shard = self.config.shard.index,
                        "session ready"
                    );
                    self.session_established();
                }
                Err(e) => {
                    self.record.clear_session();
                    self.abandon_connection(format!("malformed READY: {e}"));
                    return;
                }
            },
            RESUMED_EVENT => {
                info!(seq = ?self.record.sequence, "session resumed");
                self.session_established();
            }
            _ => {}
        }

        self.publish(GatewayEvent::Dispatch {
            event_type,
            sequence: frame.s,
            payload: frame.d,
        });
    }

    fn session_established(&mut self) {
        self.backoff.reset();
        self.identify_retry_at = None;
        self.set_state(ConnectionState::Ready);
        self.send_manager.mark_ready();
    }

    fn on_hello(&mut self, frame: &GatewayFrame) {
        let hello = match frame.payload::<HelloPayload>() {
            Ok(hello) if hello.heartbeat_interval > 0 => hello,
            Ok(_) => {
                self.abandon_connection("Hello with a zero heartbeat interval".to_string());
                return;
            }
            Err(e) => {
                self.abandon_connection(format!("malformed Hello: {e}"));
                return;
            }
        };

        let interval = Duration::from_millis(hello.heartbeat_interval);
        self.record.heartbeat_interval = Some(interval);
        self.heartbeat.start(interval);
        debug!(?interval, "heartbeat started");
        self.publish_debug(format!("heartbeat interval {}ms", hello.heartbeat_interval));

        if self.shared.state.load() != ConnectionState::Ready {
            if self.record.can_resume() {
                self.resume();
            } else {
                self.identify();
            }
        }
    }

    fn on_heartbeat_ack(&mut self) {
        self.heartbeat.disarm_watchdog();
        if let Some(latency) = self.record.heartbeat_acked(Instant::now()) {
            debug!(?latency, "heartbeat acknowledged");
            self.shared.set_latency(latency);
            self.publish(GatewayEvent::Ping(latency));
        }
    }

    fn on_ack_timeout(&mut self) {
        let err = GatewayError::AckTimeout(self.heartbeat.ack_timeout());
        warn!(error = %err, "connection presumed dead");
        self.publish_debug(err.to_string());

        let was_ready = self.shared.state.load() == ConnectionState::Ready;
        self.drop_transport(Some(CloseCode::NORMAL));
        self.record.clear_session();
        self.publish(GatewayEvent::Disconnected {
            code: Some(CloseCode::NORMAL.as_u16()),
            reason: "heartbeat ack timeout".to_string(),
        });
        if !was_ready {
            self.backoff.record_failure();
        }
        self.schedule_reconnect();
    }

    /// Drop a connection whose handshake broke the protocol and try again.
    ///
    /// The close code keeps any server-side session resumable. A connection
    /// that never reached Ready counts as a failed attempt.
    fn abandon_connection(&mut self, reason: String) {
        let was_ready = self.shared.state.load() == ConnectionState::Ready;
        warn!(reason = %reason, "abandoning connection");
        self.publish_debug(GatewayError::Protocol(reason.clone()).to_string());
        self.drop_transport(Some(CloseCode::SESSION_PRESERVING));
        self.publish(GatewayEvent::Disconnected {
            code: Some(CloseCode::SESSION_PRESERVING.as_u16()),
            reason,
        });
        if !was_ready {
            self.backoff.record_failure();
        }
        self.schedule_reconnect();
    }

    fn on_reconnect_request(&mut self) {
        info!("server requested reconnect");
        self.publish_debug("server requested reconnect");
        self.drop_transport(Some(CloseCode::SESSION_PRESERVING));
        self.publish(GatewayEvent::Disconnected {
            code: Some(CloseCode::SESSION_PRESERVING.as_u16()),
            reason: "reconnect requested".to_string(),
        });
        self.schedule_reconnect();
    }

    fn on_invalid_session(&mut self, frame: &GatewayFrame) {
        let resumable = frame.d.as_bool().unwrap_or(false);
        let err = GatewayError::SessionInvalidated { resumable };
        info!(resumable, "session invalidated");
        self.publish_debug(err.to_string());

        if resumable && self.record.can_resume() {
            self.resume();
            return;
        }

        self.record.clear_session();
        let backoff = self.config.invalid_session_backoff();
        debug!(?backoff, "re-identifying after backoff");
        self.set_state(ConnectionState::Identifying);
        self.identify_retry_at = Some(Instant::now() + backoff);
    }

    fn on_identify_retry(&mut self) {
        self.identify_retry_at = None;
        if self.transport.is_some() {
            self.identify();
        }
    }

    fn identify(&mut self) {
        let payload = IdentifyPayload {
            token: self.credential.clone(),
            properties: self.config.connection_properties(),
            intents: self.config.intents,
            compress: self.config.compress,
            large_threshold: self.config.large_threshold,
            shard: self.config.shard.as_pair(),
        };
        debug!(shard = ?payload.shard, intents = %payload.intents, "identifying");
        self.set_state(ConnectionState::Identifying);
        self.send_manager.submit(OutboundIntent::Identify(payload));
    }

    fn resume(&mut self) {
        let Some(payload) = self.record.resume_payload(&self.credential) else {
            self.identify();
            return;
        };
        debug!(session_id = %payload.session_id, seq = ?payload.seq, "resuming");
        self.set_state(ConnectionState::Resuming);
        self.send_manager.submit(OutboundIntent::Resume(payload));
    }

    fn shutdown(&mut self, graceful: bool) {
        self.shared.stop();
        let code = if graceful {
            CloseCode::NORMAL
        } else {
            CloseCode::SESSION_PRESERVING
        };
        info!(graceful, code = code.as_u16(), "destroying gateway session");
        self.drop_transport(Some(code));
        if graceful {
            self.record.clear_session();
        }
        self.finish("destroyed".to_string());
    }

    fn terminate(&mut self, reason: String) {
        self.shared.stop();
        self.drop_transport(Some(CloseCode::NORMAL));
        self.finish(reason);
    }

    fn finish(&mut self, reason: String) {
        self.reconnect_at = None;
        self.identify_retry_at = None;
        self.set_state(ConnectionState::Destroyed);
        self.publish(GatewayEvent::Terminated { reason });
        self.finished = true;
    }
}

async fn next_transport_event(transport: &mut Option<TransportHandle>) -> Option<TransportEvent> {
    match transport {
        Some(transport) => transport.inbound.recv().await,
        None => std::future::pending().await,
    }
}

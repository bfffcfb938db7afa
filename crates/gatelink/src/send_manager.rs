//! Outbound scheduling.
//!
//! The [`SendManager`] never touches the transport itself. The session asks it
//! for the next frame that may go out now ([`SendManager::poll_next`]) and for
//! the instant it should ask again ([`SendManager::next_deadline`]); one loop
//! owns both calls, so there is never more than one sender per class and
//! budgets are counted exactly once per transmission.

use std::collections::VecDeque;
use std::mem;

use gatelink_proto::{GatewayFrame, IdentifyPayload, OpCode, ProtoError, ResumePayload};
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::rate_limit::{RateBudget, RateLimitConfig};

/// A frame the session wants to send.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundIntent {
    /// Keep-alive; the sequence is filled in at transmission time.
    Heartbeat,
    /// Start a new session.
    Identify(IdentifyPayload),
    /// Reattach to a previous session.
    Resume(ResumePayload),
    /// Any other client frame.
    Event {
        /// Opcode to send.
        opcode: OpCode,
        /// Frame payload.
        payload: Value,
    },
}

/// Budget class an intent is routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentClass {
    /// Heartbeat and resume; never delayed.
    Control,
    /// Identify; limited by the identify budget.
    Identify,
    /// Everything else; limited by the generic budget.
    Event,
}

impl OutboundIntent {
    /// Class used for routing.
    #[must_use]
    pub const fn class(&self) -> IntentClass {
        match self {
            Self::Heartbeat | Self::Resume(_) => IntentClass::Control,
            Self::Identify(_) => IntentClass::Identify,
            Self::Event { .. } => IntentClass::Event,
        }
    }

    /// Opcode the intent is sent with.
    #[must_use]
    pub const fn opcode(&self) -> OpCode {
        match self {
            Self::Heartbeat => OpCode::Heartbeat,
            Self::Identify(_) => OpCode::Identify,
            Self::Resume(_) => OpCode::Resume,
            Self::Event { opcode, .. } => *opcode,
        }
    }

    /// Build the wire frame. `sequence` is only used by heartbeats.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn into_frame(self, sequence: Option<u64>) -> Result<GatewayFrame, ProtoError> {
        match self {
            Self::Heartbeat => Ok(GatewayFrame::heartbeat(sequence)),
            Self::Identify(payload) => GatewayFrame::identify(&payload),
            Self::Resume(payload) => GatewayFrame::resume(&payload),
            Self::Event { opcode, payload } => Ok(GatewayFrame::new(opcode, payload)),
        }
    }
}

/// How far the underlying connection has come.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    /// No live transport; everything is buffered.
    Down,
    /// Transport open, handshake in progress; only control and identify flow.
    Handshaking,
    /// Session established; everything flows.
    Ready,
}

/// Rate-limited, order-preserving outbound queue owned by one session.
#[derive(Debug)]
pub struct SendManager {
    phase: LinkPhase,
    control: VecDeque<OutboundIntent>,
    identify: VecDeque<OutboundIntent>,
    events: VecDeque<OutboundIntent>,
    backlog: VecDeque<OutboundIntent>,
    identify_budget: RateBudget,
    event_budget: RateBudget,
}

impl SendManager {
    /// Create a send manager with the given budgets.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            phase: LinkPhase::Down,
            control: VecDeque::new(),
            identify: VecDeque::new(),
            events: VecDeque::new(),
            backlog: VecDeque::new(),
            identify_budget: config.identify_budget(),
            event_budget: config.event_budget(),
        }
    }

    /// Current link phase.
    #[must_use]
    pub const fn phase(&self) -> LinkPhase {
        self.phase
    }

    /// Intents buffered until the link is ready.
    #[must_use]
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Intents routed and waiting for their budget.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.control.len() + self.identify.len() + self.events.len()
    }

    /// Accept an intent. Never fails and never drops.
    pub fn submit(&mut self, intent: OutboundIntent) {
        let class = intent.class();
        match (self.phase, class) {
            (LinkPhase::Down, _) | (LinkPhase::Handshaking, IntentClass::Event) => {
                self.backlog.push_back(intent);
            }
            (_, IntentClass::Control) => self.control.push_back(intent),
            (_, IntentClass::Identify) => self.identify.push_back(intent),
            (LinkPhase::Ready, IntentClass::Event) => self.events.push_back(intent),
        }
    }

    /// A transport opened; control and identify frames may flow.
    pub fn attach(&mut self) {
        self.phase = LinkPhase::Handshaking;
        self.drain_backlog();
    }

    /// The session is established; release the backlog.
    pub fn mark_ready(&mut self) {
        self.phase = LinkPhase::Ready;
        self.drain_backlog();
    }

    /// Replay every buffered intent through [`submit`](Self::submit) in order.
    pub fn drain_backlog(&mut self) {
        let backlog = mem::take(&mut self.backlog);
        if !backlog.is_empty() {
            debug!(count = backlog.len(), phase = ?self.phase, "draining outbound backlog");
        }
        for intent in backlog {
            self.submit(intent);
        }
    }

    /// The transport is gone.
    ///
    /// Unsent event-class intents go back to the front of the backlog in
    /// order. Heartbeat, identify and resume intents belong to the dead
    /// connection and are discarded; the count is returned.
    pub fn detach(&mut self) -> usize {
        self.phase = LinkPhase::Down;
        while let Some(intent) = self.events.pop_back() {
            self.backlog.push_front(intent);
        }
        let discarded = self.control.len() + self.identify.len();
        self.control.clear();
        self.identify.clear();
        discarded
    }

    /// Take back an intent the transport refused after [`poll_next`](Self::poll_next)
    /// released it.
    ///
    /// Event-class intents return to the head of their queue (or of the
    /// backlog once the link is no longer ready). Connection-bound intents
    /// are discarded. Returns whether the intent was kept.
    pub fn requeue(&mut self, intent: OutboundIntent) -> bool {
        if intent.class() != IntentClass::Event {
            return false;
        }
        if self.phase == LinkPhase::Ready {
            self.events.push_front(intent);
        } else {
            self.backlog.push_front(intent);
        }
        true
    }

    /// Next intent allowed out at `now`, recording it against its budget.
    ///
    /// Control intents always win; identify and event intents are released
    /// strictly FIFO within their class.
    pub fn poll_next(&mut self, now: Instant) -> Option<OutboundIntent> {
        if self.phase == LinkPhase::Down {
            return None;
        }
        if let Some(intent) = self.control.pop_front() {
            return Some(intent);
        }
        if !self.identify.is_empty() && self.identify_budget.try_acquire(now) {
            return self.identify.pop_front();
        }
        if !self.events.is_empty() && self.event_budget.try_acquire(now) {
            return self.events.pop_front();
        }
        None
    }

    /// Earliest instant a queued intent becomes eligible, if anything is queued.
    pub fn next_deadline(&mut self, now: Instant) -> Option<Instant> {
        if self.phase == LinkPhase::Down {
            return None;
        }
        let mut deadline: Option<Instant> = None;
        if !self.control.is_empty() {
            deadline = Some(now);
        }
        if !self.identify.is_empty() {
            let at = self.identify_budget.next_available(now);
            deadline = Some(deadline.map_or(at, |d| d.min(at)));
        }
        if !self.events.is_empty() {
            let at = self.event_budget.next_available(now);
            deadline = Some(deadline.map_or(at, |d| d.min(at)));
        }
        deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatelink_proto::{ConnectionProperties, Intents};
    use serde_json::json;
    use std::time::Duration;

    fn event(n: u64) -> OutboundIntent {
        OutboundIntent::Event {
            opcode: OpCode::PresenceUpdate,
            payload: json!({ "n": n }),
        }
    }

    fn identify() -> OutboundIntent {
        OutboundIntent::Identify(IdentifyPayload {
            token: "tok".to_string(),
            properties: ConnectionProperties::new("linux", "gatelink"),
            intents: Intents::GUILDS,
            compress: false,
            large_threshold: 50,
            shard: [0, 1],
        })
    }

    fn ready_manager() -> SendManager {
        let mut manager = SendManager::new(&RateLimitConfig::default());
        manager.attach();
        manager.mark_ready();
        manager
    }

    /// Run the scheduler until the queues are empty, returning send times.
    fn run_to_completion(manager: &mut SendManager, start: Instant) -> Vec<(Instant, OutboundIntent)> {
        let mut sent = Vec::new();
        let mut now = start;
        loop {
            while let Some(intent) = manager.poll_next(now) {
                sent.push((now, intent));
            }
            match manager.next_deadline(now) {
                Some(next) => {
                    assert!(next > now, "deadline must move forward");
                    now = next;
                }
                None => break,
            }
        }
        sent
    }

    #[test]
    fn test_intent_classes() {
        assert_eq!(OutboundIntent::Heartbeat.class(), IntentClass::Control);
        assert_eq!(identify().class(), IntentClass::Identify);
        assert_eq!(event(0).class(), IntentClass::Event);
        let resume = OutboundIntent::Resume(ResumePayload {
            token: "tok".into(),
            session_id: "s".into(),
            seq: Some(1),
        });
        assert_eq!(resume.class(), IntentClass::Control);
        assert_eq!(resume.opcode(), OpCode::Resume);
    }

    #[test]
    fn test_heartbeat_frame_uses_sequence() {
        let frame = OutboundIntent::Heartbeat.into_frame(Some(9)).unwrap();
        assert_eq!(frame.op, 1);
        assert_eq!(frame.d, json!(9));
    }

    #[test]
    fn test_submit_while_down_goes_to_backlog() {
        let mut manager = SendManager::new(&RateLimitConfig::default());
        manager.submit(event(1));
        manager.submit(OutboundIntent::Heartbeat);

        assert_eq!(manager.backlog_len(), 2);
        assert_eq!(manager.pending_len(), 0);
        assert!(manager.poll_next(Instant::now()).is_none());
        assert!(manager.next_deadline(Instant::now()).is_none());
    }

    #[test]
    fn test_events_wait_for_ready() {
        let mut manager = SendManager::new(&RateLimitConfig::default());
        manager.attach();
        manager.submit(event(1));
        manager.submit(OutboundIntent::Heartbeat);

        let now = Instant::now();
        assert_eq!(manager.poll_next(now), Some(OutboundIntent::Heartbeat));
        assert!(manager.poll_next(now).is_none());
        assert_eq!(manager.backlog_len(), 1);

        manager.mark_ready();
        assert_eq!(manager.poll_next(now), Some(event(1)));
    }

    #[test]
    fn test_control_preempts_queued_events() {
        let mut manager = ready_manager();
        let now = Instant::now();
        for n in 0..5 {
            manager.submit(event(n));
        }
        assert_eq!(manager.poll_next(now), Some(event(0)));
        manager.submit(OutboundIntent::Heartbeat);
        assert_eq!(manager.poll_next(now), Some(OutboundIntent::Heartbeat));
        assert_eq!(manager.poll_next(now), Some(event(1)));
        assert!(manager.poll_next(now).is_none());
    }

    #[test]
    fn test_control_is_exempt_from_budget() {
        let mut manager = ready_manager();
        let now = Instant::now();
        for _ in 0..10 {
            manager.submit(OutboundIntent::Heartbeat);
        }
        let sent = std::iter::from_fn(|| manager.poll_next(now)).count();
        assert_eq!(sent, 10);
    }

    #[test]
    fn test_burst_of_events_respects_both_windows() {
        let mut manager = ready_manager();
        let start = Instant::now();
        for n in 0..200 {
            manager.submit(event(n));
        }

        let sent = run_to_completion(&mut manager, start);
        assert_eq!(sent.len(), 200);

        // FIFO
        for (n, (_, intent)) in sent.iter().enumerate() {
            assert_eq!(*intent, event(n as u64));
        }

        let times: Vec<Instant> = sent.iter().map(|(t, _)| *t).collect();
        for (i, first) in times.iter().enumerate() {
            let in_second = times[i..]
                .iter()
                .take_while(|t| **t < *first + Duration::from_secs(1))
                .count();
            let in_minute = times[i..]
                .iter()
                .take_while(|t| **t < *first + Duration::from_secs(60))
                .count();
            assert!(in_second <= 2, "{in_second} sends within one second");
            assert!(in_minute <= 120, "{in_minute} sends within one minute");
        }

        // 120 go out in the first minute, two per second.
        assert_eq!(times[1], start);
        assert_eq!(times[2], start + Duration::from_secs(1));
        assert_eq!(times[119], start + Duration::from_secs(59));
        assert_eq!(times[120], start + Duration::from_secs(60));
    }

    #[test]
    fn test_second_identify_deferred_to_next_window() {
        let mut manager = SendManager::new(&RateLimitConfig::default());
        manager.attach();
        let start = Instant::now();

        manager.submit(identify());
        manager.submit(identify());

        assert!(manager.poll_next(start).is_some());
        assert!(manager.poll_next(start + Duration::from_secs(4)).is_none());
        assert_eq!(
            manager.next_deadline(start + Duration::from_secs(1)),
            Some(start + Duration::from_secs(5))
        );
        assert!(manager.poll_next(start + Duration::from_secs(5)).is_some());
    }

    #[test]
    fn test_backlog_drains_in_order_under_budget() {
        let mut manager = SendManager::new(&RateLimitConfig::default());
        for n in 0..6 {
            manager.submit(event(n));
        }
        manager.attach();
        manager.mark_ready();
        assert_eq!(manager.backlog_len(), 0);

        let start = Instant::now();
        let sent = run_to_completion(&mut manager, start);
        let order: Vec<OutboundIntent> = sent.iter().map(|(_, i)| i.clone()).collect();
        assert_eq!(order, (0..6).map(event).collect::<Vec<_>>());
        assert_eq!(sent[2].0, start + Duration::from_secs(1));
        assert_eq!(sent[4].0, start + Duration::from_secs(2));
    }

    #[test]
    fn test_detach_requeues_events_and_discards_control() {
        let mut manager = ready_manager();
        let now = Instant::now();
        for n in 0..4 {
            manager.submit(event(n));
        }
        assert_eq!(manager.poll_next(now), Some(event(0)));
        assert_eq!(manager.poll_next(now), Some(event(1)));
        manager.submit(OutboundIntent::Heartbeat);

        let discarded = manager.detach();
        assert_eq!(discarded, 1);
        assert_eq!(manager.phase(), LinkPhase::Down);
        assert_eq!(manager.pending_len(), 0);

        manager.submit(event(4));
        assert_eq!(manager.backlog_len(), 3);

        manager.attach();
        manager.mark_ready();
        let later = now + Duration::from_secs(1);
        assert_eq!(manager.poll_next(later), Some(event(2)));
        assert_eq!(manager.poll_next(later), Some(event(3)));
        assert!(manager.poll_next(later).is_none());
        assert_eq!(
            manager.poll_next(later + Duration::from_secs(1)),
            Some(event(4))
        );
    }

    #[test]
    fn test_refused_event_goes_back_to_the_head() {
        let mut manager = ready_manager();
        let now = Instant::now();
        manager.submit(event(0));
        manager.submit(event(1));

        let refused = manager.poll_next(now).unwrap();
        assert!(manager.requeue(refused));
        assert!(!manager.requeue(OutboundIntent::Heartbeat));
        assert_eq!(manager.pending_len(), 2);
        assert_eq!(manager.poll_next(now), Some(event(0)));

        let refused = manager.poll_next(now + Duration::from_secs(1)).unwrap();
        manager.detach();
        assert!(manager.requeue(refused));
        assert_eq!(manager.backlog_len(), 1);
        manager.attach();
        manager.mark_ready();
        assert_eq!(
            manager.poll_next(now + Duration::from_secs(2)),
            Some(event(1))
        );
    }
}

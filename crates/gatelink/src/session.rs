//! Per-connection session record.

use std::time::Duration;

use gatelink_proto::{ReadyPayload, ResumePayload};
use tokio::time::Instant;
use tracing::warn;

use crate::config::ShardInfo;

/// What the session knows about the server-side session it is attached to.
///
/// Owned by exactly one gateway session actor; never shared.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// Last sequence seen in a dispatch.
    pub sequence: Option<u64>,
    /// Session ID from `READY`.
    pub session_id: Option<String>,
    /// Endpoint to use when resuming.
    pub resume_url: Option<String>,
    /// Interval from the last `Hello`.
    pub heartbeat_interval: Option<Duration>,
    /// When the last heartbeat was handed to the transport.
    pub last_heartbeat_sent: Option<Instant>,
    /// Whether a heartbeat is waiting for its ack.
    pub ack_pending: bool,
    /// Round trip of the last acknowledged heartbeat.
    pub latency: Option<Duration>,
    /// Shard this session serves.
    pub shard: ShardInfo,
}

impl SessionRecord {
    /// Fresh record for `shard`.
    #[must_use]
    pub const fn new(shard: ShardInfo) -> Self {
        Self {
            sequence: None,
            session_id: None,
            resume_url: None,
            heartbeat_interval: None,
            last_heartbeat_sent: None,
            ack_pending: false,
            latency: None,
            shard,
        }
    }

    /// Record a dispatch sequence. Sequences never move backwards within a session.
    pub fn observe_sequence(&mut self, sequence: u64) {
        match self.sequence {
            Some(current) if sequence < current => {
                warn!(current, received = sequence, "ignoring out-of-order sequence");
            }
            _ => self.sequence = Some(sequence),
        }
    }

    /// Capture the identifiers handed out by `READY`.
    pub fn capture_ready(&mut self, ready: &ReadyPayload) {
        self.session_id = Some(ready.session_id.clone());
        self.resume_url.clone_from(&ready.resume_gateway_url);
    }

    /// Whether a resume can be attempted.
    #[must_use]
    pub const fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.sequence.is_some()
    }

    /// Resume payload for `token`, if the session can be resumed.
    #[must_use]
    pub fn resume_payload(&self, token: &str) -> Option<ResumePayload> {
        if !self.can_resume() {
            return None;
        }
        let session_id = self.session_id.clone()?;
        Some(ResumePayload {
            token: token.to_string(),
            session_id,
            seq: self.sequence,
        })
    }

    /// Forget the server-side session; the next handshake identifies.
    pub fn clear_session(&mut self) {
        self.sequence = None;
        self.session_id = None;
        self.resume_url = None;
    }

    /// A heartbeat went out at `now`.
    pub fn heartbeat_sent(&mut self, now: Instant) {
        self.last_heartbeat_sent = Some(now);
        self.ack_pending = true;
    }

    /// An ack arrived at `now`. Returns the measured latency, or `None` when
    /// no heartbeat was waiting for one.
    pub fn heartbeat_acked(&mut self, now: Instant) -> Option<Duration> {
        if !self.ack_pending {
            return None;
        }
        self.ack_pending = false;
        let latency = now.saturating_duration_since(self.last_heartbeat_sent?);
        self.latency = Some(latency);
        Some(latency)
    }

    /// Connection-scoped fields reset when a transport goes away.
    pub fn connection_lost(&mut self) {
        self.heartbeat_interval = None;
        self.ack_pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(session_id: &str, resume_url: Option<&str>) -> ReadyPayload {
        ReadyPayload {
            v: Some(8),
            session_id: session_id.to_string(),
            resume_gateway_url: resume_url.map(str::to_string),
            shard: Some([0, 1]),
        }
    }

    #[test]
    fn test_new_record_cannot_resume() {
        let record = SessionRecord::new(ShardInfo::default());
        assert!(!record.can_resume());
        assert!(record.resume_payload("tok").is_none());
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let mut record = SessionRecord::new(ShardInfo::default());
        record.observe_sequence(3);
        record.observe_sequence(7);
        record.observe_sequence(5);
        assert_eq!(record.sequence, Some(7));
        record.observe_sequence(7);
        assert_eq!(record.sequence, Some(7));
    }

    #[test]
    fn test_resume_payload_carries_last_sequence() {
        let mut record = SessionRecord::new(ShardInfo::default());
        record.observe_sequence(1);
        record.capture_ready(&ready("abc", Some("wss://resume.example.com")));
        record.observe_sequence(42);

        let payload = record.resume_payload("tok").expect("resumable");
        assert_eq!(payload.session_id, "abc");
        assert_eq!(payload.seq, Some(42));
        assert_eq!(payload.token, "tok");
        assert_eq!(record.resume_url.as_deref(), Some("wss://resume.example.com"));
    }

    #[test]
    fn test_clear_session_forgets_identifiers() {
        let mut record = SessionRecord::new(ShardInfo { index: 1, count: 2 });
        record.observe_sequence(9);
        record.capture_ready(&ready("abc", None));
        record.clear_session();

        assert!(record.sequence.is_none());
        assert!(record.session_id.is_none());
        assert!(!record.can_resume());
        assert_eq!(record.shard, ShardInfo { index: 1, count: 2 });
    }

    #[test]
    fn test_heartbeat_latency() {
        let mut record = SessionRecord::new(ShardInfo::default());
        let sent = Instant::now();
        record.heartbeat_sent(sent);
        assert!(record.ack_pending);

        let latency = record.heartbeat_acked(sent + Duration::from_millis(50));
        assert_eq!(latency, Some(Duration::from_millis(50)));
        assert!(!record.ack_pending);
        assert_eq!(record.latency, Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_ack_without_heartbeat_has_no_latency() {
        let mut record = SessionRecord::new(ShardInfo::default());
        assert!(record.heartbeat_acked(Instant::now()).is_none());
    }

    #[test]
    fn test_duplicate_ack_keeps_measured_latency() {
        let mut record = SessionRecord::new(ShardInfo::default());
        let sent = Instant::now();
        record.heartbeat_sent(sent);
        record.heartbeat_acked(sent + Duration::from_millis(50));

        assert!(record.heartbeat_acked(sent + Duration::from_secs(10)).is_none());
        assert_eq!(record.latency, Some(Duration::from_millis(50)));
    }
}

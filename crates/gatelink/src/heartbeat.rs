//! Heartbeat timer and ack watchdog.

use std::future::pending;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Heartbeat interval timer plus the ack deadline of the outstanding heartbeat.
///
/// Both are polled from the session's event loop; stopping the heartbeater
/// drops the interval and clears the deadline, so nothing fires afterwards.
#[derive(Debug)]
pub struct Heartbeater {
    interval: Option<Interval>,
    ack_deadline: Option<Instant>,
    ack_timeout: Duration,
}

impl Heartbeater {
    /// Create a stopped heartbeater.
    #[must_use]
    pub const fn new(ack_timeout: Duration) -> Self {
        Self {
            interval: None,
            ack_deadline: None,
            ack_timeout,
        }
    }

    /// Start ticking every `period`, first tick one period from now.
    pub fn start(&mut self, period: Duration) {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        self.ack_deadline = None;
    }

    /// Stop ticking and disarm the watchdog.
    pub fn stop(&mut self) {
        self.interval = None;
        self.ack_deadline = None;
    }

    /// Whether the interval timer is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Resolve on the next tick. Never resolves while stopped.
    pub async fn tick(&mut self) -> Instant {
        match self.interval.as_mut() {
            Some(interval) => interval.tick().await,
            None => pending().await,
        }
    }

    /// Arm the watchdog for a heartbeat sent at `sent_at`.
    ///
    /// An already armed watchdog keeps its deadline.
    pub fn arm_watchdog(&mut self, sent_at: Instant) {
        if self.ack_deadline.is_none() {
            self.ack_deadline = Some(sent_at + self.ack_timeout);
        }
    }

    /// Disarm the watchdog after an ack.
    pub fn disarm_watchdog(&mut self) {
        self.ack_deadline = None;
    }

    /// When the watchdog fires, if armed.
    #[must_use]
    pub const fn ack_deadline(&self) -> Option<Instant> {
        self.ack_deadline
    }

    /// Configured ack timeout.
    #[must_use]
    pub const fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }
}

/// Sleep until `deadline`, or forever if there is none.
pub(crate) async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}

//! Reconnection policy.
//!
//! A session that loses a healthy connection reconnects at once. Every
//! consecutive failure after that (a refused connection, or a link that
//! drops before the handshake completes) doubles the wait, up to a ceiling,
//! until the session reaches Ready again.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Wait after the first failure, in milliseconds.
    pub initial_delay_ms: u64,
    /// Ceiling for the wait, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth factor per consecutive failure.
    pub backoff_multiplier: f64,
    /// Consecutive failures tolerated before giving up (None = never).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Wait after the first failure.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Ceiling for the wait.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Wait before the next attempt after `failures` consecutive failures.
    #[must_use]
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        calculate_backoff(
            failures,
            self.initial_delay(),
            self.max_delay(),
            self.backoff_multiplier,
        )
    }

    /// Whether another attempt is allowed after `failures` consecutive failures.
    #[must_use]
    pub const fn should_reconnect(&self, failures: u32) -> bool {
        match self.max_attempts {
            Some(max) => failures < max,
            None => true,
        }
    }
}

/// `initial * multiplier^(attempt - 1)`, capped at `max_delay`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff(
    attempt: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
) -> Duration {
    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let millis = initial_delay.as_millis() as f64 * multiplier.powi(exponent);
    if !millis.is_finite() || millis >= max_delay.as_millis() as f64 {
        return max_delay;
    }
    Duration::from_millis(millis.round() as u64)
}

/// Consecutive-failure counter driving the reconnect schedule.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    failures: u32,
}

impl Backoff {
    /// Start with no recorded failures.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Consecutive failures since the last healthy session.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Number of the attempt the next connection will be.
    #[must_use]
    pub const fn next_attempt(&self) -> u32 {
        self.failures.saturating_add(1)
    }

    /// Count one more failed attempt.
    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    /// Forget past failures once a session is healthy.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Wait before the next attempt, or `None` once attempts are exhausted.
    #[must_use]
    pub fn next_delay(&self) -> Option<Duration> {
        self.config
            .should_reconnect(self.failures)
            .then(|| self.config.delay_for_attempt(self.failures))
    }
}

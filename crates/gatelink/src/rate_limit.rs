//! Sliding-window rate budgets for outbound frames.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Limits for the two outbound budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Event-class frames allowed per second.
    pub events_per_second: u32,
    /// Event-class frames allowed per minute.
    pub events_per_minute: u32,
    /// Identify frames allowed per identify window.
    pub identifies_per_window: u32,
    /// Identify window in milliseconds.
    pub identify_window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            events_per_second: 2,
            events_per_minute: 120,
            identifies_per_window: 1,
            identify_window_ms: 5_000,
        }
    }
}

impl RateLimitConfig {
    /// Budget for event-class frames: both the per-second and per-minute ceilings.
    #[must_use]
    pub fn event_budget(&self) -> RateBudget {
        RateBudget::new(vec![
            SlidingWindow::new(self.events_per_second, Duration::from_secs(1)),
            SlidingWindow::new(self.events_per_minute, Duration::from_secs(60)),
        ])
    }

    /// Budget for identify frames.
    #[must_use]
    pub fn identify_budget(&self) -> RateBudget {
        RateBudget::new(vec![SlidingWindow::new(
            self.identifies_per_window,
            Duration::from_millis(self.identify_window_ms),
        )])
    }
}

/// Send timestamps within one window.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    /// Send timestamps still inside the window, oldest first.
    timestamps: VecDeque<Instant>,
    /// Window duration.
    window_size: Duration,
    /// Maximum sends allowed in any window.
    max_requests: u32,
}

impl SlidingWindow {
    /// Create a new sliding window.
    #[must_use]
    pub fn new(max_requests: u32, window_size: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests as usize + 1),
            window_size,
            max_requests,
        }
    }

    /// Drop timestamps that no longer count at `now`.
    fn prune(&mut self, now: Instant) {
        while self
            .timestamps
            .front()
            .is_some_and(|t| *t + self.window_size <= now)
        {
            self.timestamps.pop_front();
        }
    }

    /// Number of sends counted at `now`.
    pub fn current_count(&mut self, now: Instant) -> u32 {
        self.prune(now);
        self.timestamps.len() as u32
    }

    /// Earliest instant a send is allowed; `now` if allowed immediately.
    pub fn next_available(&mut self, now: Instant) -> Instant {
        self.prune(now);
        if (self.timestamps.len() as u32) < self.max_requests {
            return now;
        }
        // Full: a slot frees when the send that made it full ages out.
        let index = self.timestamps.len() - self.max_requests as usize;
        self.timestamps
            .get(index)
            .map_or(now, |t| *t + self.window_size)
    }

    /// Record a send at `now`.
    pub fn record(&mut self, now: Instant) {
        self.timestamps.push_back(now);
    }

    /// Window duration.
    #[must_use]
    pub const fn window_size(&self) -> Duration {
        self.window_size
    }

    /// Maximum sends per window.
    #[must_use]
    pub const fn max_requests(&self) -> u32 {
        self.max_requests
    }
}

/// One or more windows that must all have capacity before a send.
#[derive(Debug, Clone)]
pub struct RateBudget {
    windows: Vec<SlidingWindow>,
}

impl RateBudget {
    /// Combine windows into one budget.
    #[must_use]
    pub fn new(windows: Vec<SlidingWindow>) -> Self {
        Self { windows }
    }

    /// Earliest instant every window allows a send.
    pub fn next_available(&mut self, now: Instant) -> Instant {
        self.windows
            .iter_mut()
            .map(|w| w.next_available(now))
            .max()
            .unwrap_or(now)
    }

    /// Record a send if every window has capacity at `now`.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if self.next_available(now) > now {
            return false;
        }
        for window in &mut self.windows {
            window.record(now);
        }
        true
    }

    /// Per-window counts at `now`, in construction order.
    pub fn counts(&mut self, now: Instant) -> Vec<u32> {
        self.windows.iter_mut().map(|w| w.current_count(now)).collect()
    }
}

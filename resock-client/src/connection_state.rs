//! Connection activity timestamps
//!
//! The connection aggregate keeps two clocks besides its state: when the last
//! message arrived (keep-alive detection) and when the supervisor last tried
//! to reopen (throttling). Both use `tokio::time::Instant` so they follow the
//! runtime clock, including a paused test clock.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Receive and reopen timestamps of one connection
#[derive(Debug)]
pub(crate) struct Activity {
    last_received: Mutex<Instant>,
    last_reopen: Mutex<Option<Instant>>,
}

impl Activity {
    pub(crate) fn new() -> Self {
        Self {
            last_received: Mutex::new(Instant::now()),
            last_reopen: Mutex::new(None),
        }
    }

    /// Record that something arrived now
    pub(crate) fn touch_received(&self) {
        *self.last_received.lock() = Instant::now();
    }

    pub(crate) fn last_received(&self) -> Instant {
        *self.last_received.lock()
    }

    /// Time since the last inbound message
    pub(crate) fn silent_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_received())
    }

    pub(crate) fn mark_reopen(&self, now: Instant) {
        *self.last_reopen.lock() = Some(now);
    }

    /// True while the previous reopen attempt is closer than `throttle`
    pub(crate) fn reopen_throttled(&self, now: Instant, throttle: Duration) -> bool {
        match *self.last_reopen.lock() {
            Some(last) if !throttle.is_zero() => now.saturating_duration_since(last) < throttle,
            _ => false,
        }
    }
}

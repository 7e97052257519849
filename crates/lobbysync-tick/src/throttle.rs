//! Leading-edge write throttle.

use std::time::Duration;

use tokio::time::Instant;

/// Lets the first call through, then rejects calls until `interval` has
/// elapsed since the last accepted one.
///
/// Used for typing markers: while the user keeps typing, at most one
/// write per interval reaches the store.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// Returns `true` if the caller may act now, and records the attempt.
    pub fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Forget the last accepted call, so the next one passes.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

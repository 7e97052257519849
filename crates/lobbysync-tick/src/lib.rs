//! Timers for Lobbysync.
//!
//! The lobby protocol has exactly two periodic timers (the presence
//! heartbeat and the start countdown) plus two kinds of rate control on
//! writes (a leading-edge throttle for typing markers and cancellable
//! debounced tasks for settings saves and typing expiry).
//!
//! # Integration
//!
//! Periodic timers are designed to sit inside a session actor's
//! `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = heartbeat.wait_for_tick() => { /* upsert presence */ }
//!         step = countdown.wait_for_step() => { /* render or hand off */ }
//!     }
//! }
//! ```
//!
//! All timers use Tokio's clock, so tests drive them with
//! `#[tokio::test(start_paused = true)]`.

mod countdown;
mod delayed;
mod throttle;

pub use countdown::{Countdown, CountdownStep};
pub use delayed::DelayedTask;
pub use throttle::Throttle;

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a tick fires late (the task was busy or the machine
/// slept).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Skip the missed tick(s) and resume one period from now.
    /// Right for heartbeats: one fresh write replaces many stale ones.
    #[default]
    Skip,
    /// Keep the original cadence. The next tick fires at its originally
    /// scheduled time even if that is already in the past.
    Drop,
}

/// Full configuration for a [`TickScheduler`].
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks. `None` = the scheduler never fires.
    pub period: Option<Duration>,
    /// Late-tick handling.
    pub policy: TickPolicy,
    /// Fire the first tick immediately instead of one period after
    /// creation. A heartbeat wants this so the record exists right away.
    pub fire_immediately: bool,
    /// Random jitter (0–max) added to the first scheduled tick, so many
    /// clients entering a lobby at once don't heartbeat in lockstep.
    pub initial_jitter: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period: None,
            policy: TickPolicy::default(),
            fire_immediately: false,
            initial_jitter: Duration::ZERO,
        }
    }
}

impl TickConfig {
    /// Smallest accepted period. Shorter periods are clamped.
    pub const MIN_PERIOD: Duration = Duration::from_millis(10);

    /// A config that ticks every `period`.
    pub fn every(period: Duration) -> Self {
        Self {
            period: Some(period),
            ..Default::default()
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if let Some(period) = self.period {
            if period < Self::MIN_PERIOD {
                warn!(
                    period_ms = period.as_millis() as u64,
                    min_ms = Self::MIN_PERIOD.as_millis() as u64,
                    "tick period below minimum, clamping"
                );
                self.period = Some(Self::MIN_PERIOD);
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info (returned to caller each tick)
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by
/// [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// `true` if this tick fired noticeably late.
    pub overrun: bool,
    /// How many ticks were skipped because of the delay.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Periodic tick source. One per heartbeat.
pub struct TickScheduler {
    config: TickConfig,
    tick_count: u64,
    /// When the next tick should fire.
    next_tick: Option<Instant>,
    paused: bool,
}

impl TickScheduler {
    /// Create a new scheduler from config.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();

        let next_tick = config.period.map(|period| {
            let jitter = if config.initial_jitter > Duration::ZERO {
                let max_us = config.initial_jitter.as_micros() as u64;
                Duration::from_micros(rand::rng().random_range(0..max_us.max(1)))
            } else {
                Duration::ZERO
            };
            let first = if config.fire_immediately { Duration::ZERO } else { period };
            Instant::now() + first + jitter
        });

        match config.period {
            None => debug!("tick scheduler created without a period (never fires)"),
            Some(period) => debug!(
                period_ms = period.as_millis() as u64,
                policy = ?config.policy,
                "tick scheduler created"
            ),
        }

        Self {
            config,
            tick_count: 0,
            next_tick,
            paused: false,
        }
    }

    /// A scheduler ticking every `period` with default settings.
    pub fn every(period: Duration) -> Self {
        Self::new(TickConfig::every(period))
    }

    /// Wait until the next tick is due.
    ///
    /// Without a period, or while paused, this future pends forever. It
    /// never resolves on its own, but `tokio::select!` keeps serving the
    /// other branches.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (next, period) = match (self.next_tick, self.config.period) {
            (Some(next), Some(period)) if !self.paused => (next, period),
            _ => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;

        // More than 10% late counts as an overrun.
        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > period / 10;
        let mut ticks_skipped = 0u64;

        self.next_tick = Some(match self.config.policy {
            TickPolicy::Skip => {
                if overrun {
                    ticks_skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
                    if ticks_skipped > 0 {
                        warn!(
                            tick = self.tick_count,
                            skipped = ticks_skipped,
                            late_ms = late_by.as_millis() as u64,
                            "tick overrun, skipping ahead"
                        );
                    }
                }
                now + period
            }
            TickPolicy::Drop => next + period,
        });

        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    /// Pause ticking. Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(tick = self.tick_count, "tick scheduler paused");
        }
    }

    /// Resume after a pause. The next tick is one full period from now,
    /// so a long pause doesn't produce a burst.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            if let Some(period) = self.config.period {
                self.next_tick = Some(Instant::now() + period);
            }
            debug!(tick = self.tick_count, "tick scheduler resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Number of ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The configured period, or `None` if the scheduler never fires.
    pub fn period(&self) -> Option<Duration> {
        self.config.period
    }
}

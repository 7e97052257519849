//! Fixed-length countdown built on [`TickScheduler`].

use std::time::Duration;

use crate::{TickConfig, TickPolicy, TickScheduler};

/// One step of a [`Countdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    /// One interval elapsed; this many remain.
    Remaining(u32),
    /// The last interval elapsed.
    Finished,
}

/// Counts `ticks` intervals down to zero.
///
/// The countdown is purely local: each client starts its own when it
/// observes the transition, so clients are only as synchronized as their
/// change feeds.
pub struct Countdown {
    total: u32,
    remaining: u32,
    scheduler: TickScheduler,
    finished: bool,
}

impl Countdown {
    pub fn new(ticks: u32, interval: Duration) -> Self {
        Self {
            total: ticks,
            remaining: ticks,
            scheduler: TickScheduler::new(TickConfig {
                policy: TickPolicy::Drop,
                ..TickConfig::every(interval)
            }),
            finished: false,
        }
    }

    /// The starting value.
    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Waits for the next interval. After [`CountdownStep::Finished`] has
    /// been returned once, this pends forever.
    pub async fn wait_for_step(&mut self) -> CountdownStep {
        if self.finished {
            std::future::pending::<()>().await;
        }
        if self.remaining > 0 {
            self.scheduler.wait_for_tick().await;
            self.remaining -= 1;
        }
        if self.remaining == 0 {
            self.finished = true;
            CountdownStep::Finished
        } else {
            CountdownStep::Remaining(self.remaining)
        }
    }
}

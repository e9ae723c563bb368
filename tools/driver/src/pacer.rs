//! Fixed-rate tick source.
//!
//! The pacer only decides *when* to send. Ticks come from a tokio interval
//! with `MissedTickBehavior::Skip`: if the consumer stalls, at most one
//! overdue tick is delivered and the rest are dropped rather than replayed
//! as a burst.

use std::time::Duration;

use spinload_types::now_ms;
use tokio::sync::watch;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::config::RunDuration;
use crate::errors::{DriverError, Result};

/// One dispatch opportunity.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    /// Zero-based tick counter.
    pub index: u64,
    /// When the interval fired.
    pub at: Instant,
    /// Wall-clock epoch milliseconds at `at`, for records.
    pub epoch_ms: u64,
}

pub struct Pacer {
    interval: Interval,
    period: Duration,
    deadline: Option<Instant>,
    stop: watch::Receiver<bool>,
    emitted: u64,
    finished: bool,
}

/// Interval between ticks for `rps`, never shorter than a nanosecond.
pub fn tick_period(rps: u64) -> Duration {
    Duration::from_nanos((1_000_000_000 / rps.max(1)).max(1))
}

impl Pacer {
    /// Start pacing now. `rps == 0` is rejected.
    pub fn start(rps: u64, duration: RunDuration, stop: watch::Receiver<bool>) -> Result<Self> {
        if rps == 0 {
            return Err(DriverError::InvalidRate(rps));
        }
        let period = tick_period(rps);
        let start = Instant::now();

        let mut interval = time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Ok(Self {
            interval,
            period,
            deadline: duration.as_duration().map(|d| start + d),
            stop,
            emitted: 0,
            finished: false,
        })
    }

    /// Wait for the next tick. `None` once the run duration has elapsed or a
    /// stop was requested; every later call also returns `None`.
    ///
    /// Cancel safe.
    pub async fn tick(&mut self) -> Option<Tick> {
        if self.finished {
            return None;
        }

        let deadline = self.deadline;
        let fired = tokio::select! {
            biased;
            _ = stop_requested(&mut self.stop) => None,
            at = self.interval.tick() => Some(at),
            _ = sleep_until_deadline(deadline) => None,
        };

        match fired {
            Some(at) if deadline.map_or(true, |d| at < d) => {
                let tick = Tick {
                    index: self.emitted,
                    at,
                    epoch_ms: now_ms(),
                };
                self.emitted += 1;
                Some(tick)
            }
            _ => {
                self.finished = true;
                None
            }
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Resolves once `true` is published. A dropped sender never stops the run.
pub async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

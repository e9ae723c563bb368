//! Turns pacer ticks into independent call attempts.
//!
//! Every tick spawns one task that owns a single attempt end to end: it
//! issues the call under its own deadline and hands the terminal outcome to
//! the recorder exactly once. The pacer never waits on a call.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use spinload_types::{duration_ms, Attempt, Outcome, WorkRequest};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::errors::CallError;
use crate::pacer::Tick;
use crate::recorder::OutcomeRecorder;
use crate::transport::WorkClient;

/// Hands out dispatch sequence numbers, starting at 1.
///
/// Safe to share between tasks; numbers are unique and strictly increasing
/// in allocation order.
#[derive(Debug)]
pub struct SequenceAllocator {
    next: AtomicU64,
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl SequenceAllocator {
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// How many numbers have been handed out so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed) - 1
    }
}

/// Per-run constants stamped onto every attempt.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub rps: u64,
    pub spin_ms: u64,
    pub call_timeout: Duration,
    /// `None` keeps in-flight concurrency unbounded.
    pub max_in_flight: Option<usize>,
}

pub struct Dispatcher {
    client: Arc<dyn WorkClient>,
    recorder: Arc<OutcomeRecorder>,
    sequence: Arc<SequenceAllocator>,
    settings: DispatchSettings,
    limiter: Option<Arc<Semaphore>>,
    in_flight: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn WorkClient>,
        recorder: Arc<OutcomeRecorder>,
        settings: DispatchSettings,
    ) -> Self {
        Self::with_sequence(client, recorder, settings, Arc::default())
    }

    /// Build a dispatcher that draws sequence numbers from a shared allocator.
    pub fn with_sequence(
        client: Arc<dyn WorkClient>,
        recorder: Arc<OutcomeRecorder>,
        settings: DispatchSettings,
        sequence: Arc<SequenceAllocator>,
    ) -> Self {
        Self {
            client,
            recorder,
            sequence,
            limiter: settings
                .max_in_flight
                .map(|cap| Arc::new(Semaphore::new(cap))),
            settings,
            in_flight: JoinSet::new(),
        }
    }

    /// Start one attempt for `tick` and return its sequence number.
    ///
    /// Never waits: with a cap configured and no permit free, the attempt is
    /// recorded as a failure on the spot instead of being queued.
    pub fn dispatch(&mut self, tick: &Tick) -> u64 {
        let seq = self.sequence.next();
        let settings = self.settings;
        let template = Attempt {
            dispatched_at_ms: tick.epoch_ms,
            rps: settings.rps,
            spin_ms: settings.spin_ms,
            sequence: seq,
            latency_ms: 0,
            outcome: Outcome::Failure,
        };
        debug!(seq, tick = tick.index, lag = ?tick.at.elapsed(), "dispatching attempt");

        let permit = match &self.limiter {
            Some(limiter) => match Arc::clone(limiter).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!(
                        seq,
                        tick = tick.index,
                        in_flight = self.in_flight.len(),
                        "in-flight cap reached, attempt shed"
                    );
                    self.recorder.record_shed(&template);
                    return seq;
                }
            },
            None => None,
        };

        let client = Arc::clone(&self.client);
        let recorder = Arc::clone(&self.recorder);
        self.in_flight.spawn(async move {
            let _permit = permit;
            let started = Instant::now();
            let result = call_with_deadline(client.as_ref(), settings).await;
            let latency_ms = duration_ms(started.elapsed());

            let outcome = match result {
                Ok(_) => {
                    debug!(seq, latency_ms, "attempt succeeded");
                    Outcome::Success
                }
                Err(err) => {
                    warn!(seq, latency_ms, "attempt failed: {}", err);
                    Outcome::Failure
                }
            };
            recorder.record(&Attempt {
                latency_ms,
                outcome,
                ..template
            });
        });

        seq
    }

    /// Collect attempts that already finished, without waiting.
    pub fn reap(&mut self) -> usize {
        let mut reaped = 0;
        while let Some(joined) = self.in_flight.try_join_next() {
            log_join_error(joined);
            reaped += 1;
        }
        reaped
    }

    /// Wait until every dispatched attempt has reached a terminal outcome.
    pub async fn drain(&mut self) -> usize {
        let mut drained = 0;
        while let Some(joined) = self.in_flight.join_next().await {
            log_join_error(joined);
            drained += 1;
        }
        drained
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn dispatched(&self) -> u64 {
        self.sequence.issued()
    }
}

/// Issue one call bounded by the per-attempt deadline. A panicking client is
/// reported as a failed call.
async fn call_with_deadline(
    client: &dyn WorkClient,
    settings: DispatchSettings,
) -> Result<(), CallError> {
    let call = AssertUnwindSafe(client.invoke(WorkRequest::new(settings.spin_ms))).catch_unwind();
    match time::timeout(settings.call_timeout, call).await {
        Ok(Ok(Ok(_response))) => Ok(()),
        Ok(Ok(Err(err))) => Err(err),
        Ok(Err(_panic)) => Err(CallError::Panicked),
        Err(_elapsed) => Err(CallError::Timeout(settings.call_timeout)),
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        warn!("attempt task ended abnormally: {}", err);
    }
}

//! Run lifecycle: `Idle -> Running -> Draining -> Complete`.

use std::fmt;
use std::sync::Arc;

use spinload_types::{now_ms, RunSummary};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::DriverConfig;
use crate::dispatcher::{DispatchSettings, Dispatcher};
use crate::errors::{DriverError, Result};
use crate::pacer::Pacer;
use crate::recorder::OutcomeRecorder;
use crate::transport::WorkClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Draining,
    Complete,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Draining => "draining",
            RunState::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Owns one run from configuration check to summary. A controller runs at
/// most once.
pub struct RunController {
    config: DriverConfig,
    client: Arc<dyn WorkClient>,
    recorder: Arc<OutcomeRecorder>,
    state: RunState,
}

impl RunController {
    pub fn new(
        config: DriverConfig,
        client: Arc<dyn WorkClient>,
        recorder: Arc<OutcomeRecorder>,
    ) -> Self {
        Self {
            config,
            client,
            recorder,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Execute the run.
    ///
    /// Configuration problems and an unreachable target fail before the first
    /// attempt is dispatched. After that nothing is fatal: the call returns
    /// once every dispatched attempt has been recorded. Publishing `true` on
    /// `stop` ends dispatching early and moves straight to draining.
    pub async fn run(&mut self, stop: watch::Receiver<bool>) -> Result<RunSummary> {
        if self.state != RunState::Idle {
            return Err(DriverError::AlreadyRun);
        }
        self.config.validate()?;

        if self.config.probe {
            self.client
                .probe()
                .await
                .map_err(|source| DriverError::Unreachable {
                    target: self.client.endpoint().to_string(),
                    source,
                })?;
        }

        let mut pacer = Pacer::start(self.config.rps, self.config.duration, stop)?;
        let mut dispatcher = Dispatcher::new(
            Arc::clone(&self.client),
            Arc::clone(&self.recorder),
            DispatchSettings {
                rps: self.config.rps,
                spin_ms: self.config.spin_ms,
                call_timeout: self.config.call_timeout,
                max_in_flight: self.config.max_in_flight,
            },
        );

        let started_at_ms = now_ms();
        let started = Instant::now();
        self.transition(RunState::Running);
        info!(
            worker = %self.client.endpoint(),
            rps = self.config.rps,
            spin_ms = self.config.spin_ms,
            duration = %self.config.duration,
            period = ?pacer.period(),
            "dispatching"
        );

        while let Some(tick) = pacer.tick().await {
            dispatcher.dispatch(&tick);
            dispatcher.reap();
            self.recorder.flush_if_due();
        }
        let dispatch_window = started.elapsed();

        self.transition(RunState::Draining);
        info!(
            dispatched = dispatcher.dispatched(),
            in_flight = dispatcher.in_flight(),
            "waiting for in-flight attempts"
        );
        dispatcher.drain().await;

        if let Err(err) = self.recorder.flush() {
            warn!("failed to flush attempt records: {}", err);
        }
        let elapsed = started.elapsed();
        self.transition(RunState::Complete);

        let stats = self.recorder.stats();
        let summary = RunSummary {
            target: self.client.endpoint().to_string(),
            target_rps: self.config.rps,
            spin_ms: self.config.spin_ms,
            total_attempts: stats.totals.attempts,
            successes: stats.totals.successes,
            failures: stats.totals.failures,
            shed: stats.shed,
            started_at_ms,
            ended_at_ms: now_ms(),
            elapsed_secs: elapsed.as_secs_f64(),
            achieved_rps: dispatcher.dispatched() as f64
                / dispatch_window.as_secs_f64().max(0.001),
            latency_ms_p50: stats.latency_ms_p50,
            latency_ms_p95: stats.latency_ms_p95,
            latency_ms_p99: stats.latency_ms_p99,
            latency_ms_max: stats.latency_ms_max,
        };

        if stats.write_errors > 0 {
            warn!(
                write_errors = stats.write_errors,
                "some attempt records could not be written"
            );
        }
        info!(
            total = summary.total_attempts,
            successes = summary.successes,
            failures = summary.failures,
            achieved_rps = summary.achieved_rps,
            "run complete"
        );
        Ok(summary)
    }

    fn transition(&mut self, next: RunState) {
        info!(from = %self.state, to = %next, "run state changed");
        self.state = next;
    }
}

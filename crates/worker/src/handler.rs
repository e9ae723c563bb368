use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use spinload_telemetry::OutcomeMetrics;
use spinload_types::{duration_ms, Outcome, WorkRequest, WorkResponse};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::spin::WorkSimulator;

/// Service-side entry point, invoked once per inbound `InvokeWork` call.
///
/// Holds no per-request state: the only shared mutation is the injected
/// metrics aggregator and a served-requests counter, both lock-free, so any
/// number of calls may run at once.
pub struct RequestHandler {
    simulator: WorkSimulator,
    metrics: Arc<OutcomeMetrics>,
    served: AtomicU64,
}

impl RequestHandler {
    pub fn new(metrics: Arc<OutcomeMetrics>) -> Self {
        Self {
            simulator: WorkSimulator::new(),
            metrics,
            served: AtomicU64::new(0),
        }
    }

    /// Run the requested spin on the blocking pool so the async reactor is
    /// never occupied by it, then report the elapsed time.
    pub async fn invoke(&self, request: WorkRequest) -> Result<WorkResponse> {
        let start = Instant::now();
        let simulator = self.simulator;
        let spun = tokio::task::spawn_blocking(move || simulator.run(request.duration_ms)).await;

        let latency_ms = duration_ms(start.elapsed());
        match spun {
            Ok(_) => Ok(self.complete(request, latency_ms)),
            Err(err) => {
                warn!("work task for {} ms failed: {}", request.duration_ms, err);
                self.metrics.observe(Outcome::Failure, latency_ms);
                Err(err.into())
            }
        }
    }

    /// Same as [`invoke`](Self::invoke) but spins on the calling thread.
    #[cfg(test)]
    pub(crate) fn invoke_blocking(&self, request: WorkRequest) -> WorkResponse {
        let start = Instant::now();
        self.simulator.run(request.duration_ms);
        self.complete(request, duration_ms(start.elapsed()))
    }

    fn complete(&self, request: WorkRequest, latency_ms: u64) -> WorkResponse {
        self.served.fetch_add(1, Ordering::Relaxed);
        self.metrics.observe(Outcome::Success, latency_ms);
        debug!(
            spin_ms = request.duration_ms,
            latency_ms, "work request processed"
        );
        WorkResponse::processed(request.duration_ms)
    }

    pub fn requests_served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> &Arc<OutcomeMetrics> {
        &self.metrics
    }
}

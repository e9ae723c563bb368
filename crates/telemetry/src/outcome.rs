use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{Counter, Histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use spinload_types::Outcome;

use crate::buckets::{exponential_buckets, LATENCY_BUCKETS_MS};
use crate::errors::Result;

/// Point-in-time copy of the in-process totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeTotals {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Counters of calls by outcome plus a latency histogram, owned by whoever
/// constructs it.
///
/// The Prometheus series live in a private recorder, so two aggregators in
/// one process (tests, or a driver and an in-process worker) never share
/// state. Exposed series, for a prefix `p`:
///
/// - `p_requests_total{status="success"|"failure"}`
/// - `p_request_latency_ms` histogram, buckets 1..16384 ms
pub struct OutcomeMetrics {
    prefix: String,
    // Keeps the registry alive alongside the handles registered into it.
    _recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    success: Counter,
    failure: Counter,
    latency: Histogram,
    attempts: AtomicU64,
    failures: AtomicU64,
}

impl OutcomeMetrics {
    pub fn new(prefix: &str) -> Result<Self> {
        let counter_name = format!("{prefix}_requests_total");
        let latency_name = format!("{prefix}_request_latency_ms");

        let (start, factor, count) = LATENCY_BUCKETS_MS;
        let buckets = exponential_buckets(start, factor, count)?;
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Full(latency_name.clone()), &buckets)?
            .build_recorder();
        let handle = recorder.handle();

        let (success, failure, latency) = metrics::with_local_recorder(&recorder, || {
            metrics::describe_counter!(
                counter_name.clone(),
                format!("Total number of requests observed by the {prefix}")
            );
            metrics::describe_histogram!(
                latency_name.clone(),
                metrics::Unit::Milliseconds,
                "Request latency in milliseconds"
            );
            (
                metrics::counter!(counter_name.clone(), "status" => Outcome::Success.as_str()),
                metrics::counter!(counter_name.clone(), "status" => Outcome::Failure.as_str()),
                metrics::histogram!(latency_name.clone()),
            )
        });

        Ok(Self {
            prefix: prefix.to_string(),
            _recorder: recorder,
            handle,
            success,
            failure,
            latency,
            attempts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    /// Count one terminal outcome and its latency. Failures still contribute
    /// a latency observation.
    pub fn observe(&self, outcome: Outcome, latency_ms: u64) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Outcome::Success => self.success.increment(1),
            Outcome::Failure => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                self.failure.increment(1);
            }
        }
        self.latency.record(latency_ms as f64);
    }

    pub fn totals(&self) -> OutcomeTotals {
        // Read failures first so a concurrent observe can only make
        // `attempts` larger, never leave `successes` negative.
        let failures = self.failures.load(Ordering::Acquire);
        let attempts = self.attempts.load(Ordering::Acquire).max(failures);
        OutcomeTotals {
            attempts,
            successes: attempts - failures,
            failures,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prometheus text exposition of every series in this aggregator.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

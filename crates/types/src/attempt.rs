use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Column order of the durable attempt record.
pub const RECORD_HEADER: [&str; 6] = ["timestamp_ms", "rps", "spin_ms", "seq", "latency_ms", "status"];

/// Terminal outcome of a single call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown outcome label: {0}")]
pub struct UnknownOutcome(String);

impl FromStr for Outcome {
    type Err = UnknownOutcome;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "success" => Ok(Outcome::Success),
            "failure" => Ok(Outcome::Failure),
            other => Err(UnknownOutcome(other.to_string())),
        }
    }
}

/// One completed call attempt, exactly as it is appended to the durable record.
///
/// Field order matches [`RECORD_HEADER`]; the CSV writer relies on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    /// Dispatch instant in epoch milliseconds (taken at the pacer tick).
    #[serde(rename = "timestamp_ms")]
    pub dispatched_at_ms: u64,
    /// Configured target rate for the run.
    pub rps: u64,
    /// Configured simulated work per call.
    pub spin_ms: u64,
    /// Globally unique, strictly increasing dispatch sequence number.
    #[serde(rename = "seq")]
    pub sequence: u64,
    /// Observed latency from dispatch of the call until its terminal outcome.
    pub latency_ms: u64,
    #[serde(rename = "status")]
    pub outcome: Outcome,
}

/// Aggregate totals reported once a run reaches `Complete`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub target: String,
    pub target_rps: u64,
    pub spin_ms: u64,
    pub total_attempts: u64,
    pub successes: u64,
    pub failures: u64,
    /// Attempts failed locally because the optional in-flight cap was reached.
    pub shed: u64,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    pub elapsed_secs: f64,
    pub achieved_rps: f64,
    pub latency_ms_p50: f64,
    pub latency_ms_p95: f64,
    pub latency_ms_p99: f64,
    pub latency_ms_max: u64,
}

impl RunSummary {
    /// `total == successes + failures`, which every finished run must satisfy.
    pub fn is_consistent(&self) -> bool {
        self.total_attempts == self.successes.saturating_add(self.failures)
            && self.shed <= self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels_round_trip() {
        for outcome in [Outcome::Success, Outcome::Failure] {
            assert_eq!(outcome.as_str().parse::<Outcome>().unwrap(), outcome);
        }
        assert!("timeout".parse::<Outcome>().is_err());
    }

    #[test]
    fn attempt_serializes_in_record_column_order() {
        let attempt = Attempt {
            dispatched_at_ms: 1_700_000_000_000,
            rps: 5,
            spin_ms: 100,
            sequence: 7,
            latency_ms: 104,
            outcome: Outcome::Success,
        };
        let value = serde_json::to_value(&attempt).unwrap();
        let keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        let mut expected = RECORD_HEADER.to_vec();
        expected.sort_unstable();
        let mut keys_sorted = keys.clone();
        keys_sorted.sort_unstable();
        assert_eq!(keys_sorted, expected);
        assert_eq!(value["status"], "success");
    }

    #[test]
    fn summary_consistency() {
        let mut summary = RunSummary {
            total_attempts: 10,
            successes: 7,
            failures: 3,
            shed: 1,
            ..RunSummary::default()
        };
        assert!(summary.is_consistent());
        summary.failures = 2;
        assert!(!summary.is_consistent());
    }
}

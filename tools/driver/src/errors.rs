//! Error types for the load driver

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Fatal errors. All of them surface before the first attempt is
/// dispatched, or while setting up the process around a run.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("rate must be a positive number of requests per second, got {0}")]
    InvalidRate(u64),

    #[error("per-call timeout must be greater than zero")]
    InvalidTimeout,

    #[error("max in-flight cap must be greater than zero when set")]
    InvalidInFlightCap,

    #[error("invalid run duration `{0}` (expected e.g. `30s`, `12m` or `unbounded`)")]
    InvalidDuration(String),

    #[error("configuration file {0} not found")]
    ConfigNotFound(PathBuf),

    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("target {target} is unreachable: {source}")]
    Unreachable {
        target: String,
        #[source]
        source: CallError,
    },

    #[error("this run has already been executed")]
    AlreadyRun,

    #[error("failed to build RPC client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] spinload_telemetry::TelemetryError),
}

/// Why a single call attempt failed. Always turned into a failed attempt
/// record; never propagated past the dispatcher.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("deadline exceeded after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("call panicked")]
    Panicked,
}

/// Durable record failures. Logged and counted, never fatal once running.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("failed to create record file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read records from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write record: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to flush record: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("latency histogram error: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),
}

pub type Result<T> = std::result::Result<T, DriverError>;

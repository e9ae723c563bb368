//! Error types for telemetry setup

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("invalid bucket layout: {0}")]
    InvalidBuckets(String),

    #[error("failed to build metrics recorder: {0}")]
    Recorder(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to bind metrics listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown log format: {0} (expected `pretty` or `json`)")]
    UnknownLogFormat(String),

    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;

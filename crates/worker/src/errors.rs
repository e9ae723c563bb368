//! Error types for the worker service

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("work task did not complete: {0}")]
    Interrupted(#[from] tokio::task::JoinError),

    #[error("configuration file {0} not found")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to bind RPC listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("RPC server terminated unexpectedly: {0}")]
    Serve(#[source] std::io::Error),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] spinload_telemetry::TelemetryError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

use serde::{Deserialize, Serialize};

/// Body of an `InvokeWork` call: how long the worker should keep a CPU busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRequest {
    /// Requested simulated CPU time in milliseconds.
    pub duration_ms: u64,
}

impl WorkRequest {
    pub fn new(duration_ms: u64) -> Self {
        Self { duration_ms }
    }
}

/// Acknowledgement returned by the worker. The driver never parses `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkResponse {
    pub message: String,
}

impl WorkResponse {
    pub fn processed(spin_ms: u64) -> Self {
        Self {
            message: format!("processed in {spin_ms} ms by worker"),
        }
    }
}

/// Payload served by the worker's `/health` route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub status: String,
    pub pid: u32,
    pub uptime_secs: u64,
    pub requests_served: u64,
}

//! Spinload worker: the target service of a load experiment.
//!
//! Each `InvokeWork` call busy-spins a CPU for the requested number of
//! milliseconds, so response latency is controllable and the process shows
//! up as CPU-bound to whatever is scaling it.

pub mod config;
pub mod errors;
pub mod handler;
pub mod server;
pub mod spin;

pub use config::WorkerConfig;
pub use errors::{Result, WorkerError};
pub use handler::RequestHandler;
pub use server::{build_router, serve, start_server, AppState};
pub use spin::{busy_spin, WorkSimulator};

/// Metric name prefix for the service side.
pub const METRICS_PREFIX: &str = "worker";

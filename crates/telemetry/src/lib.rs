//! Telemetry shared by the worker and the load driver.
//!
//! Nothing in here installs a global metrics recorder: every component that
//! counts outcomes is handed an [`OutcomeMetrics`] at construction time, and
//! each binary serves the one it owns on its own `/metrics` port. Both
//! binaries also share logging setup and stop-signal handling from here.

pub mod buckets;
pub mod errors;
pub mod exporter;
pub mod logging;
pub mod outcome;
pub mod shutdown;

pub use buckets::{exponential_buckets, LATENCY_BUCKETS_MS};
pub use errors::{Result, TelemetryError};
pub use exporter::{metrics_router, serve_metrics};
pub use logging::{init_logging, LogFormat};
pub use outcome::{OutcomeMetrics, OutcomeTotals};
pub use shutdown::{ShutdownSignal, StopSignal};

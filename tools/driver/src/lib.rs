//! Open-loop load generator.
//!
//! A [`Pacer`] emits ticks at a fixed rate, the [`Dispatcher`] turns each tick
//! into an independent call that never holds up the next one, and the
//! [`OutcomeRecorder`] appends every terminal outcome to a CSV record while
//! updating the injected metrics. [`RunController`] drives one run from
//! start to a fully drained [`RunSummary`](spinload_types::RunSummary).

pub mod analyze;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod errors;
pub mod pacer;
pub mod recorder;
pub mod report;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::{DriverConfig, RunDuration};
pub use controller::{RunController, RunState};
pub use dispatcher::{DispatchSettings, Dispatcher, SequenceAllocator};
pub use errors::{CallError, DriverError, RecordError, Result};
pub use pacer::{Pacer, Tick};
pub use recorder::{OutcomeRecorder, RecordStats};
pub use transport::{HttpWorkClient, WorkClient};

/// Metric name prefix for the generator side.
pub const METRICS_PREFIX: &str = "load_driver";

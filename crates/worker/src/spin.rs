//! CPU-bound work simulation.
//!
//! The worker must look busy to anything sampling CPU utilisation (an
//! autoscaler in particular), so waiting is done by spinning on the
//! monotonic clock instead of sleeping.

use std::hint;
use std::time::{Duration, Instant};

/// Occupies the calling thread for a requested number of milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkSimulator;

impl WorkSimulator {
    pub fn new() -> Self {
        Self
    }

    /// Spin for at least `duration_ms` and return the time actually spent.
    ///
    /// Blocks the current thread; async callers go through `spawn_blocking`.
    pub fn run(&self, duration_ms: u64) -> Duration {
        busy_spin(Duration::from_millis(duration_ms))
    }
}

/// Keep the CPU busy until `duration` has elapsed on the monotonic clock.
pub fn busy_spin(duration: Duration) -> Duration {
    let start = Instant::now();
    if duration.is_zero() {
        return start.elapsed();
    }

    loop {
        let elapsed = start.elapsed();
        if elapsed >= duration {
            return elapsed;
        }
        hint::spin_loop();
    }
}

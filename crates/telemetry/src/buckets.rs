use crate::errors::{Result, TelemetryError};

/// Latency buckets shared by both sides: 1, 2, 4 ... 16384 ms.
pub const LATENCY_BUCKETS_MS: (f64, f64, usize) = (1.0, 2.0, 15);

/// Upper bounds `start, start*factor, start*factor^2, ...` with `count` entries.
pub fn exponential_buckets(start: f64, factor: f64, count: usize) -> Result<Vec<f64>> {
    if count < 1 {
        return Err(TelemetryError::InvalidBuckets(
            "bucket count must be at least 1".into(),
        ));
    }
    if !(start > 0.0) || !start.is_finite() {
        return Err(TelemetryError::InvalidBuckets(format!(
            "start must be positive, got {start}"
        )));
    }
    if !(factor > 1.0) || !factor.is_finite() {
        return Err(TelemetryError::InvalidBuckets(format!(
            "factor must be greater than 1, got {factor}"
        )));
    }

    let mut bounds = Vec::with_capacity(count);
    let mut next = start;
    for _ in 0..count {
        bounds.push(next);
        next *= factor;
    }
    Ok(bounds)
}

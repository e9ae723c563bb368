use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock time in milliseconds since the Unix epoch.
///
/// Only used for timestamps written to records; elapsed time is always
/// measured with a monotonic `Instant`.
pub fn now_ms() -> u64 {
    to_epoch_ms(SystemTime::now())
}

/// Convert a `SystemTime` into epoch milliseconds, clamping pre-epoch values to 0.
pub fn to_epoch_ms(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Saturating conversion of a duration into whole milliseconds.
pub fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_epoch_clamps_to_zero() {
        let before = UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(to_epoch_ms(before), 0);
    }

    #[test]
    fn epoch_ms_matches_duration() {
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(to_epoch_ms(at), 1_700_000_000_123);
    }

    #[test]
    fn duration_ms_truncates() {
        assert_eq!(duration_ms(Duration::from_micros(1_999)), 1);
        assert_eq!(duration_ms(Duration::ZERO), 0);
    }
}

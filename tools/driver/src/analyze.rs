//! Offline summary of one or more attempt record files.
//!
//! Rows inside the warm-up window (measured from the earliest timestamp of
//! each file) are dropped, the rest are grouped by `(rps, spin_ms)` and
//! reduced to median / p95 latency and the relative overhead of the median
//! over the requested spin.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use spinload_types::{duration_ms, Attempt};
use tracing::debug;

use crate::errors::RecordError;

pub const DEFAULT_WARMUP: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub rps: u64,
    pub spin_ms: u64,
    pub samples: u64,
    pub failures: u64,
    pub median_ms: f64,
    pub p95_ms: f64,
    /// `(median - spin) / spin`; `None` when `spin_ms == 0`.
    pub overhead: Option<f64>,
}

pub fn read_records(path: &Path) -> Result<Vec<Attempt>, RecordError> {
    let read_err = |source| RecordError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(read_err)?;
    reader
        .deserialize()
        .collect::<Result<Vec<Attempt>, _>>()
        .map_err(read_err)
}

/// Keep rows at or after `first timestamp + warmup`.
pub fn drop_warmup(records: Vec<Attempt>, warmup: Duration) -> Vec<Attempt> {
    let Some(first) = records.iter().map(|r| r.dispatched_at_ms).min() else {
        return records;
    };
    let cutoff = first.saturating_add(duration_ms(warmup));
    records
        .into_iter()
        .filter(|r| r.dispatched_at_ms >= cutoff)
        .collect()
}

/// Quantile of an ascending slice, linearly interpolated between ranks.
pub fn quantile(sorted: &[u64], q: f64) -> f64 {
    match sorted {
        [] => 0.0,
        [only] => *only as f64,
        _ => {
            let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let (a, b) = (sorted[lo] as f64, sorted[hi] as f64);
            a + (b - a) * (rank - lo as f64)
        }
    }
}

pub fn summarize(records: impl IntoIterator<Item = Attempt>) -> Vec<GroupStats> {
    let mut groups: BTreeMap<(u64, u64), (Vec<u64>, u64)> = BTreeMap::new();
    for record in records {
        let (latencies, failures) = groups.entry((record.rps, record.spin_ms)).or_default();
        latencies.push(record.latency_ms);
        if !record.outcome.is_success() {
            *failures += 1;
        }
    }

    groups
        .into_iter()
        .map(|((rps, spin_ms), (mut latencies, failures))| {
            latencies.sort_unstable();
            let median_ms = quantile(&latencies, 0.5);
            GroupStats {
                rps,
                spin_ms,
                samples: latencies.len() as u64,
                failures,
                median_ms,
                p95_ms: quantile(&latencies, 0.95),
                overhead: (spin_ms > 0).then(|| (median_ms - spin_ms as f64) / spin_ms as f64),
            }
        })
        .collect()
}

/// Read every file, trim each one's warm-up, and summarise the union.
pub fn analyze_files(paths: &[PathBuf], warmup: Duration) -> Result<Vec<GroupStats>, RecordError> {
    let mut kept = Vec::new();
    for path in paths {
        let records = read_records(path)?;
        let total = records.len();
        let trimmed = drop_warmup(records, warmup);
        debug!(
            path = %path.display(),
            total,
            kept = trimmed.len(),
            "loaded attempt records"
        );
        kept.extend(trimmed);
    }
    Ok(summarize(kept))
}

pub fn render_table(groups: &[GroupStats]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>8} {:>8} {:>9} {:>9} {:>11} {:>11} {:>9}",
        "rps", "spin_ms", "samples", "failures", "median_ms", "p95_ms", "overhead"
    );
    for g in groups {
        let overhead = g
            .overhead
            .map(|o| format!("{o:.3}"))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:>8} {:>8} {:>9} {:>9} {:>11.2} {:>11.2} {:>9}",
            g.rps, g.spin_ms, g.samples, g.failures, g.median_ms, g.p95_ms, overhead
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use spinload_types::Outcome;
    use std::io::Write;

    fn row(ts: u64, rps: u64, spin_ms: u64, seq: u64, latency_ms: u64, ok: bool) -> Attempt {
        Attempt {
            dispatched_at_ms: ts,
            rps,
            spin_ms,
            sequence: seq,
            latency_ms,
            outcome: if ok { Outcome::Success } else { Outcome::Failure },
        }
    }

    #[test]
    fn quantiles_interpolate_between_ranks() {
        assert_eq!(quantile(&[], 0.5), 0.0);
        assert_eq!(quantile(&[7], 0.95), 7.0);
        assert_eq!(quantile(&[1, 2, 3, 4], 0.5), 2.5);
        let hundred: Vec<u64> = (1..=100).collect();
        assert!((quantile(&hundred, 0.95) - 95.05).abs() < 1e-9);
    }

    #[test]
    fn warmup_is_measured_from_first_row() {
        let records = vec![
            row(10_000, 5, 100, 1, 300, true),
            row(60_000, 5, 100, 2, 250, true),
            row(130_000, 5, 100, 3, 110, true),
            row(200_000, 5, 100, 4, 120, true),
        ];
        let kept = drop_warmup(records, DEFAULT_WARMUP);
        assert_eq!(kept.iter().map(|r| r.sequence).collect::<Vec<_>>(), vec![3, 4]);
        assert!(drop_warmup(Vec::new(), DEFAULT_WARMUP).is_empty());
    }

    #[test]
    fn groups_by_rate_and_spin() {
        let stats = summarize(vec![
            row(0, 5, 100, 1, 100, true),
            row(0, 5, 100, 2, 120, true),
            row(0, 5, 100, 3, 30_000, false),
            row(0, 10, 0, 1, 2, true),
        ]);
        assert_eq!(stats.len(), 2);

        assert_eq!((stats[0].rps, stats[0].spin_ms), (5, 100));
        assert_eq!(stats[0].samples, 3);
        assert_eq!(stats[0].failures, 1);
        assert_eq!(stats[0].median_ms, 120.0);
        assert!((stats[0].overhead.unwrap() - 0.2).abs() < 1e-9);

        assert_eq!((stats[1].rps, stats[1].spin_ms), (10, 0));
        assert_eq!(stats[1].overhead, None);
    }

    #[test]
    fn analyzes_record_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp_ms,rps,spin_ms,seq,latency_ms,status").unwrap();
        writeln!(file, "1000,5,100,1,900,success").unwrap();
        writeln!(file, "3000,5,100,2,104,success").unwrap();
        writeln!(file, "3200,5,100,3,30000,failure").unwrap();
        writeln!(file, "3400,5,100,4,100,success").unwrap();
        file.flush().unwrap();

        let stats = analyze_files(&[file.path().to_path_buf()], Duration::from_secs(2)).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].samples, 3);
        assert_eq!(stats[0].failures, 1);
        assert_eq!(stats[0].median_ms, 104.0);

        let table = render_table(&stats);
        assert!(table.lines().next().unwrap().contains("median_ms"));
        assert!(table.contains("104.00"));
    }

    #[test]
    fn malformed_file_reports_its_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp_ms,rps,spin_ms,seq,latency_ms,status").unwrap();
        writeln!(file, "1000,5,100,1,900,maybe").unwrap();
        file.flush().unwrap();

        let err = analyze_files(&[file.path().to_path_buf()], Duration::ZERO).unwrap_err();
        assert!(matches!(err, RecordError::Read { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use spinload_telemetry::{OutcomeMetrics, OutcomeTotals};
use spinload_types::{Attempt, RECORD_HEADER};
use tracing::warn;

use crate::errors::RecordError;

/// Highest latency the summary histogram tracks exactly (10 minutes).
const MAX_TRACKED_LATENCY_MS: u64 = 600_000;

/// Buffered rows are pushed to the output at least this often while the run
/// is producing them.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshot of everything the recorder has accepted so far.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RecordStats {
    pub totals: OutcomeTotals,
    pub shed: u64,
    pub write_errors: u64,
    pub latency_ms_p50: f64,
    pub latency_ms_p95: f64,
    pub latency_ms_p99: f64,
    pub latency_ms_max: u64,
}

struct RecordSink {
    out: BufWriter<Box<dyn Write + Send>>,
    latencies: Histogram<u64>,
    shed: u64,
    write_errors: u64,
    flush_interval: Duration,
    last_flush: Instant,
}

impl RecordSink {
    fn flush(&mut self) -> std::io::Result<()> {
        self.last_flush = Instant::now();
        self.out.flush()
    }

    fn flush_if_due(&mut self) {
        if self.last_flush.elapsed() < self.flush_interval {
            return;
        }
        if let Err(err) = self.flush() {
            warn!("failed to flush attempt records: {}", err);
        }
    }
}

/// Encode one row into its own buffer so a failed append never leaves part
/// of a record in the output.
fn encode_row<F>(fill: F) -> Result<Vec<u8>, RecordError>
where
    F: FnOnce(&mut csv::Writer<Vec<u8>>) -> csv::Result<()>,
{
    let mut row = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::with_capacity(64));
    fill(&mut row)?;
    row.into_inner()
        .map_err(|err| RecordError::Io(err.into_error()))
}

/// Terminal sink for completed attempts.
///
/// Each `record` call updates the injected counters, the latency
/// distributions and appends one CSV row while holding a single lock, so rows
/// land in completion order and never interleave. A row is either appended
/// whole or dropped and counted in `write_errors`.
pub struct OutcomeRecorder {
    sink: Mutex<RecordSink>,
    metrics: Arc<OutcomeMetrics>,
    path: Option<PathBuf>,
}

impl OutcomeRecorder {
    /// Create (or truncate) `path` and write the header row.
    pub fn create(path: &Path, metrics: Arc<OutcomeMetrics>) -> Result<Self, RecordError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| RecordError::Create {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = File::create(path).map_err(|source| RecordError::Create {
            path: path.to_path_buf(),
            source,
        })?;

        let mut recorder = Self::from_writer(Box::new(file), metrics)?;
        recorder.path = Some(path.to_path_buf());
        Ok(recorder)
    }

    /// Record into an arbitrary writer. Output is buffered here, so `writer`
    /// should not be buffered itself.
    pub fn from_writer(
        writer: Box<dyn Write + Send>,
        metrics: Arc<OutcomeMetrics>,
    ) -> Result<Self, RecordError> {
        let mut out = BufWriter::new(writer);
        out.write_all(&encode_row(|row| row.write_record(RECORD_HEADER))?)?;
        out.flush()?;

        let latencies = Histogram::new_with_bounds(1, MAX_TRACKED_LATENCY_MS, 3)?;

        Ok(Self {
            sink: Mutex::new(RecordSink {
                out,
                latencies,
                shed: 0,
                write_errors: 0,
                flush_interval: FLUSH_INTERVAL,
                last_flush: Instant::now(),
            }),
            metrics,
            path: None,
        })
    }

    /// Record one terminal attempt. A failed row write is logged and counted
    /// but never surfaces to the caller; counters are still updated.
    pub fn record(&self, attempt: &Attempt) {
        let mut sink = self.sink.lock();
        self.observe_locked(&mut sink, attempt);
    }

    /// Record an attempt that failed locally because the in-flight cap was
    /// full.
    pub fn record_shed(&self, attempt: &Attempt) {
        let mut sink = self.sink.lock();
        sink.shed += 1;
        self.observe_locked(&mut sink, attempt);
    }

    fn observe_locked(&self, sink: &mut RecordSink, attempt: &Attempt) {
        self.metrics.observe(attempt.outcome, attempt.latency_ms);
        sink.latencies
            .saturating_record(attempt.latency_ms.clamp(1, MAX_TRACKED_LATENCY_MS));

        // BufWriter either buffers the whole row or rejects it before copying
        // any of it; bytes already buffered survive a failed inner write.
        let appended = encode_row(|row| row.serialize(attempt))
            .and_then(|bytes| sink.out.write_all(&bytes).map_err(RecordError::from));
        match appended {
            Ok(()) => sink.flush_if_due(),
            Err(err) => {
                sink.write_errors += 1;
                warn!(seq = attempt.sequence, "failed to append attempt record: {}", err);
            }
        }
    }

    /// Flush buffered rows to the underlying writer.
    pub fn flush(&self) -> Result<(), RecordError> {
        self.sink.lock().flush()?;
        Ok(())
    }

    /// Flush if nothing has been flushed for a while. Failures are logged and
    /// the rows stay buffered for the next attempt.
    pub fn flush_if_due(&self) {
        self.sink.lock().flush_if_due();
    }

    pub fn stats(&self) -> RecordStats {
        let sink = self.sink.lock();
        let quantile = |q: f64| {
            if sink.latencies.is_empty() {
                0.0
            } else {
                sink.latencies.value_at_quantile(q) as f64
            }
        };
        RecordStats {
            totals: self.metrics.totals(),
            shed: sink.shed,
            write_errors: sink.write_errors,
            latency_ms_p50: quantile(0.50),
            latency_ms_p95: quantile(0.95),
            latency_ms_p99: quantile(0.99),
            latency_ms_max: sink.latencies.max(),
        }
    }

    pub fn metrics(&self) -> &Arc<OutcomeMetrics> {
        &self.metrics
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spinload_types::Outcome;
    use std::collections::BTreeSet;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn metrics() -> Arc<OutcomeMetrics> {
        Arc::new(OutcomeMetrics::new("load_driver").unwrap())
    }

    fn attempt(sequence: u64, latency_ms: u64, outcome: Outcome) -> Attempt {
        Attempt {
            dispatched_at_ms: 1_700_000_000_000 + sequence,
            rps: 5,
            spin_ms: 100,
            sequence,
            latency_ms,
            outcome,
        }
    }

    #[test]
    fn writes_header_and_rows_in_completion_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/results.csv");
        let recorder = OutcomeRecorder::create(&path, metrics()).unwrap();

        recorder.record(&attempt(2, 101, Outcome::Success));
        recorder.record(&attempt(1, 30_000, Outcome::Failure));
        recorder.flush().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "timestamp_ms,rps,spin_ms,seq,latency_ms,status");
        assert_eq!(lines[1], "1700000000002,5,100,2,101,success");
        assert_eq!(lines[2], "1700000000001,5,100,1,30000,failure");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn empty_run_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let recorder = OutcomeRecorder::create(&path, metrics()).unwrap();
        recorder.flush().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim_end(), RECORD_HEADER.join(","));
        assert_eq!(recorder.stats().latency_ms_p50, 0.0);
    }

    #[test]
    fn counts_and_quantiles() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = OutcomeRecorder::create(&dir.path().join("r.csv"), metrics()).unwrap();
        for seq in 1..=100 {
            let outcome = if seq % 10 == 0 {
                Outcome::Failure
            } else {
                Outcome::Success
            };
            recorder.record(&attempt(seq, seq, outcome));
        }
        recorder.record_shed(&attempt(101, 0, Outcome::Failure));

        let stats = recorder.stats();
        assert_eq!(stats.totals.attempts, 101);
        assert_eq!(stats.totals.failures, 11);
        assert_eq!(stats.totals.successes, 90);
        assert_eq!(stats.shed, 1);
        assert!((49.0..=51.0).contains(&stats.latency_ms_p50));
        assert!(stats.latency_ms_p95 >= 94.0);
        assert_eq!(stats.latency_ms_max, 100);
    }

    /// Accepts a fixed number of bytes, then fails like a full disk.
    struct FullDisk {
        budget: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("no space left on device"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failures_are_tolerated() {
        let recorder =
            OutcomeRecorder::from_writer(Box::new(FullDisk { budget: 256 }), metrics()).unwrap();
        // Enough rows to overflow the output buffer several times.
        for seq in 1..=2_000 {
            recorder.record(&attempt(seq, 5, Outcome::Success));
        }

        let stats = recorder.stats();
        assert_eq!(stats.totals.attempts, 2_000);
        assert_eq!(stats.totals.successes, 2_000);
        assert!(stats.write_errors > 0);
        assert!(recorder.flush().is_err());
    }

    /// In-memory output that can be switched into a failing mode. While
    /// failing, every other write accepts a few bytes before erroring.
    #[derive(Clone, Default)]
    struct FlakyDisk {
        bytes: Arc<Mutex<Vec<u8>>>,
        failing: Arc<AtomicBool>,
        partial: Arc<AtomicBool>,
    }

    impl FlakyDisk {
        fn contents(&self) -> String {
            String::from_utf8(self.bytes.lock().clone()).unwrap()
        }
    }

    impl Write for FlakyDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failing.load(Ordering::SeqCst) {
                if !self.partial.fetch_xor(true, Ordering::SeqCst) {
                    let n = buf.len().min(7);
                    self.bytes.lock().extend_from_slice(&buf[..n]);
                    return Ok(n);
                }
                return Err(io::Error::other("no space left on device"));
            }
            self.bytes.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(io::Error::other("no space left on device"));
            }
            Ok(())
        }
    }

    #[test]
    fn rows_after_recovery_stay_parseable() {
        let disk = FlakyDisk::default();
        let recorder = OutcomeRecorder::from_writer(Box::new(disk.clone()), metrics()).unwrap();

        for seq in 1..=200 {
            recorder.record(&attempt(seq, 5, Outcome::Success));
        }
        disk.failing.store(true, Ordering::SeqCst);
        for seq in 201..=600 {
            recorder.record(&attempt(seq, 5, Outcome::Success));
        }
        disk.failing.store(false, Ordering::SeqCst);
        for seq in 601..=800 {
            recorder.record(&attempt(seq, 5, Outcome::Success));
        }
        recorder.flush().unwrap();

        let text = disk.contents();
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        assert_eq!(reader.headers().unwrap().len(), 6);
        let rows = reader
            .deserialize()
            .collect::<Result<Vec<Attempt>, _>>()
            .unwrap();
        assert_eq!(rows.len(), text.lines().count() - 1);

        let stats = recorder.stats();
        assert!(stats.write_errors > 0);
        assert_eq!(rows.len() as u64 + stats.write_errors, 800);
        assert_eq!(stats.totals.attempts, 800);

        let seqs: BTreeSet<u64> = rows.iter().map(|r| r.sequence).collect();
        assert_eq!(seqs.len(), rows.len());
        assert!((1..=200).all(|seq| seqs.contains(&seq)));
        assert!((601..=800).all(|seq| seqs.contains(&seq)));
    }

    #[test]
    fn rows_reach_the_output_once_the_flush_interval_passes() {
        let disk = FlakyDisk::default();
        let recorder = OutcomeRecorder::from_writer(Box::new(disk.clone()), metrics()).unwrap();

        recorder.record(&attempt(1, 5, Outcome::Success));
        assert_eq!(disk.contents().lines().count(), 1);

        recorder.sink.lock().flush_interval = Duration::ZERO;
        recorder.flush_if_due();
        assert_eq!(disk.contents().lines().count(), 2);

        recorder.record(&attempt(2, 5, Outcome::Success));
        assert_eq!(disk.contents().lines().count(), 3);
    }

    #[test]
    fn failed_periodic_flush_keeps_rows_buffered() {
        let disk = FlakyDisk::default();
        let recorder = OutcomeRecorder::from_writer(Box::new(disk.clone()), metrics()).unwrap();
        recorder.record(&attempt(1, 5, Outcome::Success));

        recorder.sink.lock().flush_interval = Duration::ZERO;
        disk.failing.store(true, Ordering::SeqCst);
        recorder.flush_if_due();
        assert_eq!(recorder.stats().write_errors, 0);

        disk.failing.store(false, Ordering::SeqCst);
        recorder.flush().unwrap();
        let text = disk.contents();
        assert_eq!(text.lines().nth(1), Some("1700000000001,5,100,1,5,success"));
        assert_eq!(text.lines().count(), 2);
    }
}

use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;
use spinload_types::RunSummary;

use crate::errors::RecordError;

/// Write `value` as pretty JSON, creating parent directories as needed.
pub async fn write_json(path: &Path, value: &impl Serialize) -> Result<(), RecordError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| RecordError::Create {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Human readable end-of-run summary.
pub fn render_summary(summary: &RunSummary, records: Option<&Path>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "spinload-driver done");
    let _ = writeln!(out, "  target: {}", summary.target);
    let _ = writeln!(
        out,
        "  rps: {}  spin_ms: {}",
        summary.target_rps, summary.spin_ms
    );
    let _ = writeln!(out, "  total: {}", summary.total_attempts);
    let _ = writeln!(
        out,
        "  successes: {}  failures: {}  shed: {}",
        summary.successes, summary.failures, summary.shed
    );
    let _ = writeln!(out, "  elapsed_s: {:.2}", summary.elapsed_secs);
    let _ = writeln!(out, "  achieved_rps: {:.2}", summary.achieved_rps);
    let _ = writeln!(
        out,
        "  latency_ms p50/p95/p99/max: {:.2} / {:.2} / {:.2} / {}",
        summary.latency_ms_p50,
        summary.latency_ms_p95,
        summary.latency_ms_p99,
        summary.latency_ms_max
    );
    if let Some(path) = records {
        let _ = writeln!(out, "  records: {}", path.display());
    }
    out
}

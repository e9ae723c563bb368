//! Pull the metrics endpoint over a real socket.

use std::sync::Arc;

use spinload_telemetry::{serve_metrics, OutcomeMetrics};
use spinload_types::Outcome;

#[tokio::test]
async fn serves_metrics_over_tcp() {
    let metrics = Arc::new(OutcomeMetrics::new("tcp").unwrap());
    metrics.observe(Outcome::Success, 5);
    metrics.observe(Outcome::Success, 9);
    metrics.observe(Outcome::Failure, 2);

    let (addr, task) = serve_metrics("127.0.0.1:0".parse().unwrap(), Arc::clone(&metrics))
        .await
        .unwrap();

    let body = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    task.abort();

    assert!(body.contains(r#"tcp_requests_total{status="success"} 2"#), "{body}");
    assert!(body.contains(r#"tcp_requests_total{status="failure"} 1"#), "{body}");
    assert!(body.contains("tcp_request_latency_ms_count 3"), "{body}");
}

#[tokio::test]
async fn busy_port_is_reported() {
    let first = Arc::new(OutcomeMetrics::new("busy").unwrap());
    let (addr, task) = serve_metrics("127.0.0.1:0".parse().unwrap(), Arc::clone(&first))
        .await
        .unwrap();

    let second = Arc::new(OutcomeMetrics::new("busy").unwrap());
    let err = serve_metrics(addr, second).await.unwrap_err();
    task.abort();

    assert!(err.to_string().contains("failed to bind metrics listener"));
}

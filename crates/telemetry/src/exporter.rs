use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::errors::{Result, TelemetryError};
use crate::outcome::OutcomeMetrics;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Router exposing `GET /metrics` for one aggregator.
pub fn metrics_router(metrics: Arc<OutcomeMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

async fn handle_metrics(State(metrics): State<Arc<OutcomeMetrics>>) -> Response {
    let mut response = Response::new(Body::from(metrics.render()));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE),
    );
    response
}

/// Bind `addr` and serve the pull endpoint in the background.
///
/// Binding happens before this returns so a busy port is reported to the
/// caller; errors after that are only logged.
pub async fn serve_metrics(
    addr: SocketAddr,
    metrics: Arc<OutcomeMetrics>,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| TelemetryError::Bind { addr, source })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| TelemetryError::Bind { addr, source })?;

    info!(
        "starting {} metrics endpoint at {}",
        metrics.prefix(),
        local_addr
    );
    let app = metrics_router(metrics);
    let task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!("metrics endpoint terminated: {}", err);
        }
    });
    Ok((local_addr, task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::{Request, StatusCode};
    use spinload_types::Outcome;
    use tower::ServiceExt;

    #[tokio::test]
    async fn metrics_route_serves_text_exposition() {
        let metrics = Arc::new(OutcomeMetrics::new("route").unwrap());
        metrics.observe(Outcome::Success, 8);

        let response = metrics_router(metrics)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            PROMETHEUS_CONTENT_TYPE
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains(r#"route_requests_total{status="success"} 1"#));
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let metrics = Arc::new(OutcomeMetrics::new("route404").unwrap());
        let response = metrics_router(metrics)
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use spinload_types::{WorkRequest, WorkResponse, WorkerHealth};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::errors::{Result, WorkerError};
use crate::handler::RequestHandler;

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<RequestHandler>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(handler: Arc<RequestHandler>) -> Self {
        Self {
            handler,
            start_time: Instant::now(),
        }
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
struct VersionResponse {
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal<S: Into<String>>(message: S) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, payload).into_response()
    }
}

/// Serve the RPC routes on `addr` until `shutdown` resolves.
pub async fn start_server<F>(state: AppState, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = bind_listener(addr).await?;
    serve(listener, state, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr().map_err(WorkerError::Serve)?;
    info!(
        "worker RPC server listening on {}; PID {}",
        local_addr,
        std::process::id()
    );

    let app = build_router(Arc::new(state));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(WorkerError::Serve)
}

pub async fn bind_listener(addr: &str) -> Result<TcpListener> {
    let bound = if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        TcpListener::bind(socket_addr).await
    } else {
        TcpListener::bind(addr).await
    };
    bound.map_err(|source| WorkerError::Bind {
        addr: addr.to_string(),
        source,
    })
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/invoke", post(handle_invoke))
        .route("/health", get(handle_health))
        .route("/version", get(handle_version))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_invoke(
    State(state): State<SharedState>,
    Json(request): Json<WorkRequest>,
) -> std::result::Result<Json<WorkResponse>, ApiError> {
    state
        .handler
        .invoke(request)
        .await
        .map(Json)
        .map_err(|err| ApiError::internal(err.to_string()))
}

async fn handle_health(State(state): State<SharedState>) -> Json<WorkerHealth> {
    Json(WorkerHealth {
        status: "ok".to_string(),
        pid: std::process::id(),
        uptime_secs: state.uptime_seconds(),
        requests_served: state.handler.requests_served(),
    })
}

async fn handle_version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
    })
}

//! Status and metrics HTTP server.
//!
//! - `GET /healthz`: liveness, always 200
//! - `GET /readyz`: 200 once the first pass completed, 503 before
//! - `GET /status`: latest `SyncStatus` as JSON
//! - `GET /metrics`: Prometheus text format

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::status::SyncStatus;
use axum::body::Body;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state of the status handlers
#[derive(Debug, Clone)]
pub struct ServerState {
    /// Latest status, `None` until the first pass completes
    pub status: watch::Receiver<Option<SyncStatus>>,
    /// Registry rendered on `/metrics`
    pub metrics: Metrics,
}

/// Build the status router
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/healthz", get(live))
        .route("/readyz", get(ready))
        .route("/status", get(status_report))
        .route("/metrics", get(metrics))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}

/// Serve the status router on `addr` until `shutdown` fires
pub async fn serve(
    addr: SocketAddr,
    state: ServerState,
    shutdown: CancellationToken,
) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Status server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await?;

    Ok(())
}

async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn ready(Extension(state): Extension<ServerState>) -> impl IntoResponse {
    let synced = state.status.borrow().is_some();
    if synced {
        (StatusCode::OK, Json(json!({ "ready": true })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ready": false, "reason": "no reachability pass completed yet" })),
        )
    }
}

async fn status_report(Extension(state): Extension<ServerState>) -> Response {
    let status = state.status.borrow().clone();
    match status {
        Some(status) => (StatusCode::OK, Json(status)).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "reason": "no reachability pass completed yet" })),
        )
            .into_response(),
    }
}

async fn metrics(Extension(state): Extension<ServerState>) -> Response {
    match state.metrics.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => {
            warn!("Failed to render metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

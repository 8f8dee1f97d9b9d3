//! Axum router construction for the ingress server.

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the ingress router.
///
/// - `POST /v1/logs` -- OTLP/HTTP JSON export
/// - `GET /healthz` -- liveness
/// - `GET /api/stats` -- counters
///
/// Request bodies larger than `max_body_bytes` are rejected with `413`.
pub fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/v1/logs", post(handlers::export_logs))
        .route("/healthz", get(handlers::healthz))
        .route("/api/stats", get(handlers::stats))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

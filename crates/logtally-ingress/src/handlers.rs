//! HTTP endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/v1/logs` | OTLP/HTTP JSON log export |
//! | `GET` | `/healthz` | Liveness plus engine state |
//! | `GET` | `/api/stats` | Ingestion and flush counters |

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use logtally_types::{ExportLogsServiceRequest, ExportLogsServiceResponse};
use tracing::debug;

use crate::error::IngressError;
use crate::state::AppState;
use crate::stats::StatsSnapshot;

// ---------------------------------------------------------------------------
// POST /v1/logs
// ---------------------------------------------------------------------------

/// Accept an OTLP JSON export request.
///
/// Always answers `200` once the body parses; records the queue could not
/// take are reported through `partialSuccess.rejectedLogRecords`.
pub async fn export_logs(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ExportLogsServiceResponse>, IngressError> {
    let request: ExportLogsServiceRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!(error = %e, bytes = body.len(), "rejecting malformed export request");
        IngressError::from(e)
    })?;

    let outcome = state.adapter.export(&request);
    Ok(Json(outcome.to_response()))
}

// ---------------------------------------------------------------------------
// GET /healthz
// ---------------------------------------------------------------------------

/// Report liveness and the aggregator's lifecycle state.
pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "engine": state.aggregator.state(),
    }))
}

// ---------------------------------------------------------------------------
// GET /api/stats
// ---------------------------------------------------------------------------

/// Return the current ingestion counters.
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot(
        state.aggregator.queue_length(),
        state.aggregator.state().as_str(),
    ))
}

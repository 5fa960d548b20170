//! /metrics, /reload and /aors/{id}/reconfigure handlers.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use qualify_services::StoreError;

use super::ApiState;

// ── /metrics ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct MetricsResponse {
    pub gauges: BTreeMap<String, i64>,
    pub scheduled: usize,
}

pub async fn handle_metrics(State(state): State<ApiState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        gauges: state.qualifier.gauges().snapshot(),
        scheduled: state.qualifier.scheduler().len(),
    })
}

// ── /reload ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ReloadResponse {
    pub scheduled: usize,
}

pub async fn handle_reload(State(state): State<ApiState>) -> Json<ReloadResponse> {
    tracing::info!("reload requested via API");
    Json(ReloadResponse {
        scheduled: state.qualifier.reload(),
    })
}

// ── /aors/{id}/reconfigure ────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ReconfigureResponse {
    pub aor: String,
    pub contacts: Vec<String>,
}

pub async fn handle_aor_reconfigure(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ReconfigureResponse>, (StatusCode, String)> {
    match state.qualifier.admin().reconfigure_aor(&id) {
        Ok(contacts) => Ok(Json(ReconfigureResponse { aor: id, contacts })),
        Err(e @ StoreError::NotFound { .. }) => Err((StatusCode::NOT_FOUND, e.to_string())),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

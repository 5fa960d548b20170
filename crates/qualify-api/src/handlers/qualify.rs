//! /qualify and /cli/qualify handlers: on-demand probes.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use qualify_services::{CliOutput, ManagerResponse};

use super::ApiState;

// ── /qualify ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct QualifyRequest {
    #[serde(default, alias = "Endpoint")]
    pub endpoint: Option<String>,
}

/// PJSIPQualify. Errors are reported in the body, like the manager protocol.
pub async fn handle_qualify(
    State(state): State<ApiState>,
    Json(req): Json<QualifyRequest>,
) -> Json<ManagerResponse> {
    Json(state.qualifier.admin().ami_qualify(req.endpoint.as_deref()))
}

// ── /cli/qualify ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CliQualifyRequest {
    /// Words after `pjsip qualify`.
    #[serde(default)]
    pub args: Vec<String>,
}

pub async fn handle_cli_qualify(
    State(state): State<ApiState>,
    Json(req): Json<CliQualifyRequest>,
) -> Json<CliOutput> {
    Json(state.qualifier.admin().cli_qualify(&req.args))
}

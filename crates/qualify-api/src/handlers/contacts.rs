//! /endpoints/{name}/contacts and /statuses handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use qualify_core::ContactStatus;
use qualify_services::ContactStatusDetail;

use super::ApiState;

// ── /endpoints/{name}/contacts ────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EndpointContactsResponse {
    pub endpoint: String,
    pub contacts: Vec<ContactStatusDetail>,
}

pub async fn handle_endpoint_contacts(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<EndpointContactsResponse>, (StatusCode, String)> {
    let contacts = state
        .qualifier
        .admin()
        .contact_status_details(&name)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("endpoint '{}' not found", name)))?;
    Ok(Json(EndpointContactsResponse {
        endpoint: name,
        contacts,
    }))
}

// ── /statuses ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusesResponse {
    pub statuses: Vec<ContactStatus>,
}

pub async fn handle_statuses(State(state): State<ApiState>) -> Json<StatusesResponse> {
    let mut statuses = state.qualifier.store().statuses();
    statuses.sort_by(|a, b| a.id.cmp(&b.id));
    Json(StatusesResponse { statuses })
}

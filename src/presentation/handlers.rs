// HTTP request handlers
use crate::application::aggregator::PendingSite;
use crate::application::timeout_monitor::{MonitorCommand, MonitorState};
use crate::presentation::app_state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub monitor_state: MonitorState,
    pub sites: Vec<PendingSite>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Accept one device payload for a unit. Dropped readings answer 422 so the
/// sender can see why; nothing is retried on our side.
pub async fn ingest_reading(
    Path((site_id, unit_id)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> impl IntoResponse {
    match state.ingest_service.ingest_raw(&site_id, &unit_id, &body) {
        Ok(()) => (StatusCode::ACCEPTED, "accepted".to_string()),
        Err(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    }
}

/// Sites still collecting readings
pub async fn pending_sites(State(state): State<Arc<AppState>>) -> Json<PendingResponse> {
    Json(PendingResponse {
        monitor_state: state.monitor.state(),
        sites: state.aggregator.pending_sites(),
    })
}

/// Relay an operator's flush request to the timeout monitor
pub async fn flush_site(
    Path(site_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    if state.sites.get(&site_id).is_none() {
        return (StatusCode::NOT_FOUND, format!("unknown site {}", site_id));
    }

    match state.commands.try_send(MonitorCommand::FlushNow(site_id.clone())) {
        Ok(()) => (StatusCode::ACCEPTED, format!("flush of {} requested", site_id)),
        Err(e) => {
            tracing::warn!(site = %site_id, "Could not queue flush: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "monitor is busy or stopped".to_string())
        }
    }
}

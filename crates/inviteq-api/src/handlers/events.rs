//! Acceptance event ingestion

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use inviteq_common::types::AcceptanceEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{internal_error, ApiError};
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct AcceptanceRequest {
    pub campaign_id: Uuid,
    pub lead_id: Uuid,
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct AcceptanceResponse {
    /// False when the event was a duplicate or arrived for an invite
    /// that was never sent
    pub applied: bool,
}

/// POST /api/v1/events/acceptance
pub async fn record_acceptance(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AcceptanceRequest>,
) -> Result<(StatusCode, Json<AcceptanceResponse>), ApiError> {
    let event = AcceptanceEvent {
        campaign_id: request.campaign_id,
        lead_id: request.lead_id,
        accepted_at: request.accepted_at.unwrap_or_else(Utc::now),
    };

    let applied = state
        .lifecycle
        .record_acceptance(&event)
        .await
        .map_err(internal_error)?;

    // Duplicate delivery is normal for webhooks; acknowledge it either way.
    Ok((StatusCode::OK, Json(AcceptanceResponse { applied })))
}

//! Request handlers

pub mod accounts;
pub mod campaigns;
pub mod events;
pub mod health;

use axum::http::StatusCode;
use axum::Json;
use inviteq_engine::CampaignError;
use serde::Serialize;

/// Error response envelope
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn error(code: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        code,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

pub(crate) fn internal_error(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("Internal error: {}", e);
    error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "An internal error occurred",
    )
}

pub(crate) fn campaign_error(e: CampaignError) -> ApiError {
    match e {
        CampaignError::NotFound => error(StatusCode::NOT_FOUND, "not_found", "Campaign not found"),
        CampaignError::SendingAccountNotFound => error(
            StatusCode::NOT_FOUND,
            "not_found",
            "Sending account not found",
        ),
        CampaignError::InvalidState { .. } => {
            error(StatusCode::CONFLICT, "invalid_state", e.to_string())
        }
        CampaignError::NoLeads => error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "no_leads",
            "Campaign has no leads to invite",
        ),
        CampaignError::Invalid(msg) => {
            error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg)
        }
        CampaignError::Database(e) => internal_error(e),
        CampaignError::Other(e) => internal_error(e),
    }
}

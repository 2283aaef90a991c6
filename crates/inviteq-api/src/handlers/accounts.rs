//! Sending account handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use inviteq_engine::report::AccountUsage;
use inviteq_storage::models::{CreateSendingAccount, SendingAccount};
use inviteq_storage::repository::SendingAccountRepository;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{error, internal_error, ApiError};
use crate::routes::AppState;

/// LinkedIn tolerates at most a couple hundred invites a day even on
/// paid tiers; anything above is asking for a restriction.
const MAX_DAILY_LIMIT: i32 = 200;

#[derive(Debug, Deserialize)]
pub struct ListAccountsQuery {
    pub account_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub account_id: Uuid,
    pub label: String,
    pub provider_ref: String,
    pub daily_limit: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct SetLimitRequest {
    pub daily_limit: i32,
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    #[serde(default = "default_usage_days")]
    pub days: i64,
}

fn default_usage_days() -> i64 {
    7
}

fn validate_daily_limit(limit: i32) -> Result<(), ApiError> {
    if !(0..=MAX_DAILY_LIMIT).contains(&limit) {
        return Err(error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            format!("daily_limit must be between 0 and {}", MAX_DAILY_LIMIT),
        ));
    }
    Ok(())
}

/// GET /api/v1/accounts
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAccountsQuery>,
) -> Result<Json<Vec<SendingAccount>>, ApiError> {
    let repo = SendingAccountRepository::new(state.db_pool.pool().clone());

    repo.list_by_account(query.account_id)
        .await
        .map(Json)
        .map_err(internal_error)
}

/// POST /api/v1/accounts
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<SendingAccount>), ApiError> {
    if request.label.trim().is_empty() || request.provider_ref.trim().is_empty() {
        return Err(error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            "label and provider_ref must not be empty",
        ));
    }

    // Free-tier LinkedIn default when the caller does not say.
    let daily_limit = request.daily_limit.unwrap_or(25);
    validate_daily_limit(daily_limit)?;

    let repo = SendingAccountRepository::new(state.db_pool.pool().clone());
    let account = repo
        .create(CreateSendingAccount {
            account_id: request.account_id,
            label: request.label,
            provider_ref: request.provider_ref,
            daily_limit,
        })
        .await
        .map_err(internal_error)?;

    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /api/v1/accounts/:account_id
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<SendingAccount>, ApiError> {
    let repo = SendingAccountRepository::new(state.db_pool.pool().clone());

    repo.get(account_id)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| {
            error(
                StatusCode::NOT_FOUND,
                "not_found",
                "Sending account not found",
            )
        })
}

/// PATCH /api/v1/accounts/:account_id/limit
pub async fn set_daily_limit(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<Uuid>,
    Json(request): Json<SetLimitRequest>,
) -> Result<Json<SendingAccount>, ApiError> {
    validate_daily_limit(request.daily_limit)?;

    let repo = SendingAccountRepository::new(state.db_pool.pool().clone());

    repo.set_daily_limit(account_id, request.daily_limit)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| {
            error(
                StatusCode::NOT_FOUND,
                "not_found",
                "Sending account not found",
            )
        })
}

/// GET /api/v1/accounts/:account_id/usage
pub async fn account_usage(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<Uuid>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<AccountUsage>, ApiError> {
    state
        .reports
        .account_usage(account_id, query.days.clamp(1, 90))
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| {
            error(
                StatusCode::NOT_FOUND,
                "not_found",
                "Sending account not found",
            )
        })
}

//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use inviteq_engine::report::{CampaignReport, QueueStatus, ReportQuery};
use inviteq_storage::models::{Campaign, CampaignStatus, CreateCampaign, CreateLead, Lead};
use inviteq_storage::repository::{CampaignRepository, LeadRepository, ReportSortKey, SortOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{campaign_error, error, internal_error, ApiError};
use crate::routes::AppState;

/// Query parameters for listing campaigns
#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    pub account_id: Uuid,
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Campaign list response
#[derive(Debug, Serialize)]
pub struct CampaignListResponse {
    pub data: Vec<Campaign>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Request body for creating a campaign
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub account_id: Uuid,
    pub sending_account_id: Uuid,
    pub name: String,
    pub invite_message: Option<String>,
    /// Leads can come inline with the campaign or be added later
    #[serde(default)]
    pub leads: Vec<CreateLeadRequest>,
}

/// Request body for adding leads
#[derive(Debug, Deserialize)]
pub struct AddLeadsRequest {
    pub leads: Vec<CreateLeadRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub full_name: String,
    pub profile_ref: String,
    pub headline: Option<String>,
    pub company: Option<String>,
    pub responsible_user: Option<String>,
}

/// Query parameters for the campaign report
#[derive(Debug, Deserialize)]
pub struct ReportQueryParams {
    pub status: Option<String>,
    #[serde(alias = "sort")]
    pub sort_by: Option<String>,
    pub order: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

/// GET /api/v1/campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<CampaignListResponse>, ApiError> {
    let repo = CampaignRepository::new(state.db_pool.pool().clone());

    let status = match query.status.as_deref() {
        Some(s) => Some(parse_status(s)?),
        None => None,
    };

    let data = repo
        .list_by_account(query.account_id, status, query.limit, query.offset)
        .await
        .map_err(internal_error)?;
    let total = repo
        .count_by_account(query.account_id, status)
        .await
        .map_err(internal_error)?;

    Ok(Json(CampaignListResponse {
        data,
        total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// POST /api/v1/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    let campaign = state
        .controller
        .create(CreateCampaign {
            account_id: request.account_id,
            sending_account_id: request.sending_account_id,
            name: request.name,
            invite_message: request.invite_message,
        })
        .await
        .map_err(campaign_error)?;

    if !request.leads.is_empty() {
        state
            .controller
            .add_leads(campaign.id, convert_leads(request.leads))
            .await
            .map_err(campaign_error)?;
    }

    Ok((StatusCode::CREATED, Json(campaign)))
}

/// GET /api/v1/campaigns/:campaign_id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    let repo = CampaignRepository::new(state.db_pool.pool().clone());

    repo.get(campaign_id)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "not_found", "Campaign not found"))
}

/// GET /api/v1/campaigns/:campaign_id/leads
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<ReportQueryParams>,
) -> Result<Json<Vec<Lead>>, ApiError> {
    let repo = LeadRepository::new(state.db_pool.pool().clone());
    let limit = query.limit.clamp(1, 200);
    let offset = (query.page.max(1) - 1) * limit;

    let leads = repo
        .list_by_campaign(campaign_id, limit, offset)
        .await
        .map_err(internal_error)?;

    Ok(Json(leads))
}

/// POST /api/v1/campaigns/:campaign_id/leads
pub async fn add_leads(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
    Json(request): Json<AddLeadsRequest>,
) -> Result<(StatusCode, Json<Vec<Lead>>), ApiError> {
    if request.leads.is_empty() {
        return Err(error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            "No leads given",
        ));
    }

    let leads = state
        .controller
        .add_leads(campaign_id, convert_leads(request.leads))
        .await
        .map_err(campaign_error)?;

    Ok((StatusCode::CREATED, Json(leads)))
}

/// POST /api/v1/campaigns/:campaign_id/launch
pub async fn launch_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign = state
        .controller
        .launch(campaign_id)
        .await
        .map_err(campaign_error)?;

    // Kick a scheduling pass right away so the first invites land on the
    // calendar without waiting out the periodic interval.
    let scheduler = state.scheduler.clone();
    tokio::spawn(async move {
        if let Err(err) = scheduler.schedule_pass().await {
            tracing::warn!("post-launch scheduling pass failed: {:#}", err);
        }
    });

    Ok(Json(campaign))
}

/// POST /api/v1/campaigns/:campaign_id/pause
pub async fn pause_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    state
        .controller
        .pause(campaign_id)
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// POST /api/v1/campaigns/:campaign_id/resume
pub async fn resume_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    state
        .controller
        .resume(campaign_id)
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// POST /api/v1/campaigns/:campaign_id/cancel
pub async fn cancel_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    state
        .controller
        .cancel(campaign_id)
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// GET /api/v1/campaigns/:campaign_id/queue-status
pub async fn queue_status(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<QueueStatus>, ApiError> {
    ensure_campaign_exists(&state, campaign_id).await?;

    state
        .reports
        .queue_status(campaign_id)
        .await
        .map(Json)
        .map_err(internal_error)
}

/// GET /api/v1/campaigns/:campaign_id/report
pub async fn campaign_report(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
    Query(params): Query<ReportQueryParams>,
) -> Result<Json<CampaignReport>, ApiError> {
    ensure_campaign_exists(&state, campaign_id).await?;

    let status = match params.status.as_deref() {
        Some(s) => Some(s.parse().map_err(|_| {
            error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                format!("Unknown invite status: {}", s),
            )
        })?),
        None => None,
    };

    let sort = match params.sort_by.as_deref() {
        Some(s) => ReportSortKey::parse(s).ok_or_else(|| {
            error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                format!("Unknown sort key: {}", s),
            )
        })?,
        None => ReportSortKey::default(),
    };

    let order = match params.order.as_deref() {
        Some(s) => SortOrder::parse(s).ok_or_else(|| {
            error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                format!("Unknown sort order: {}", s),
            )
        })?,
        None => SortOrder::default(),
    };

    state
        .reports
        .campaign_report(
            campaign_id,
            ReportQuery {
                status,
                sort,
                order,
                page: params.page,
                limit: params.limit,
            },
        )
        .await
        .map(Json)
        .map_err(internal_error)
}

fn convert_leads(leads: Vec<CreateLeadRequest>) -> Vec<CreateLead> {
    leads
        .into_iter()
        .map(|lead| CreateLead {
            full_name: lead.full_name,
            profile_ref: lead.profile_ref,
            headline: lead.headline,
            company: lead.company,
            responsible_user: lead.responsible_user,
        })
        .collect()
}

async fn ensure_campaign_exists(state: &AppState, campaign_id: Uuid) -> Result<(), ApiError> {
    let repo = CampaignRepository::new(state.db_pool.pool().clone());
    repo.get(campaign_id)
        .await
        .map_err(internal_error)?
        .map(|_| ())
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "not_found", "Campaign not found"))
}

fn parse_status(s: &str) -> Result<CampaignStatus, ApiError> {
    s.parse().map_err(|_| {
        error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            format!("Unknown campaign status: {}", s),
        )
    })
}

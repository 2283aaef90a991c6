//! API routes

use axum::{
    routing::{get, patch, post},
    Router,
};
use inviteq_engine::{CampaignController, InviteScheduler, LifecycleManager, ReportAggregator};
use inviteq_storage::DatabasePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, campaigns, events, health};

/// Shared state for all handlers
pub struct AppState {
    pub db_pool: DatabasePool,
    pub controller: CampaignController,
    pub lifecycle: LifecycleManager,
    pub reports: ReportAggregator,
    /// Used to kick an immediate scheduling pass on launch instead of
    /// waiting out the periodic interval
    pub scheduler: Arc<InviteScheduler>,
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/ready", get(health::readiness));

    let campaign_routes = Router::new()
        .route("/", get(campaigns::list_campaigns))
        .route("/", post(campaigns::create_campaign))
        .route("/:campaign_id", get(campaigns::get_campaign))
        .route("/:campaign_id/leads", get(campaigns::list_leads))
        .route("/:campaign_id/leads", post(campaigns::add_leads))
        .route("/:campaign_id/launch", post(campaigns::launch_campaign))
        .route("/:campaign_id/pause", post(campaigns::pause_campaign))
        .route("/:campaign_id/resume", post(campaigns::resume_campaign))
        .route("/:campaign_id/cancel", post(campaigns::cancel_campaign))
        .route("/:campaign_id/queue-status", get(campaigns::queue_status))
        .route("/:campaign_id/report", get(campaigns::campaign_report));

    let account_routes = Router::new()
        .route("/", get(accounts::list_accounts))
        .route("/", post(accounts::create_account))
        .route("/:account_id", get(accounts::get_account))
        .route("/:account_id/limit", patch(accounts::set_daily_limit))
        .route("/:account_id/usage", get(accounts::account_usage));

    let event_routes = Router::new().route("/acceptance", post(events::record_acceptance));

    let api_v1 = Router::new()
        .nest("/campaigns", campaign_routes)
        .nest("/accounts", account_routes)
        .nest("/events", event_routes);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

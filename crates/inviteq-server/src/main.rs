//! InviteQ - connection invite campaign engine entry point

use anyhow::Result;
use inviteq_api::AppState;
use inviteq_common::config::Config;
use inviteq_engine::send::UnipileClient;
use inviteq_engine::{
    CampaignController, Dispatcher, InviteScheduler, LifecycleManager, ReportAggregator,
};
use inviteq_storage::db::DatabasePool;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so logging can honor it
    let config = Config::load()?;
    init_logging(&config);

    info!("Starting InviteQ...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;

    // Run migrations
    db_pool.migrate().await?;

    // Send integration
    let integration = Arc::new(UnipileClient::new(&config.unipile)?);

    // Engine components
    let scheduler = Arc::new(InviteScheduler::new(&db_pool, &config.engine));
    let dispatcher = Arc::new(Dispatcher::new(&db_pool, &config.engine, integration));
    let lifecycle = LifecycleManager::new(&db_pool, &config.engine);
    let controller = CampaignController::new(&db_pool, config.engine.respace_on_resume);
    let reports = ReportAggregator::new(&db_pool);

    // Start the scheduling loop
    let scheduler_handle = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler.run().await;
        })
    };

    // Start the dispatch loop
    let dispatcher_handle = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.run().await;
        })
    };

    // Start the lifecycle sweep loop
    let lifecycle_handle = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move {
            lifecycle.run().await;
        })
    };

    // Start API server
    let api_handle = {
        let state = Arc::new(AppState {
            db_pool: db_pool.clone(),
            controller,
            lifecycle,
            reports,
            scheduler: scheduler.clone(),
        });
        let bind = format!("{}:{}", config.api.bind, config.api.port);

        tokio::spawn(async move {
            let app = inviteq_api::create_router(state);
            let listener = match tokio::net::TcpListener::bind(&bind).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!("Failed to bind API server on {}: {}", bind, e);
                    return;
                }
            };
            info!("API server listening on {}", bind);
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API server error: {}", e);
            }
        })
    };

    info!("InviteQ started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler_handle.abort();
    dispatcher_handle.abort();
    lifecycle_handle.abort();
    api_handle.abort();

    info!("InviteQ shutdown complete");

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},inviteq=debug", config.logging.level)));

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true))
            .with(filter)
            .init();
    }
}

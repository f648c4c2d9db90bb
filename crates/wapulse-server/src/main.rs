//! WaPulse - Campaign server entry point

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wapulse_api::{create_router, AppState};
use wapulse_common::config::{Config, LoggingConfig};
use wapulse_core::{
    CampaignController, CampaignScheduler, CampaignStores, DeliveryReportPoller, EngineMetrics,
    MessageDispatcher, WhatsAppClient,
};
use wapulse_storage::repository::{
    CampaignRepository, ContactRepository, MediaRepository, TemplateRepository,
};
use wapulse_storage::{DatabasePool, MemoryStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration comes first so logging can follow it
    let config = Config::load()?;
    init_logging(&config.logging);

    info!("Starting WaPulse campaign server...");

    // Initialize stores
    let (stores, db_pool) = match config.database.backend.as_str() {
        "memory" => {
            warn!("Using the in-memory backend; campaigns are lost on restart");
            (CampaignStores::from_memory(MemoryStore::new()), None)
        }
        _ => {
            let db_pool = DatabasePool::new(&config.database).await?;
            info!("Database connection established");

            db_pool.migrate().await?;
            info!("Database migrations completed");

            let stores = CampaignStores {
                campaigns: Arc::new(CampaignRepository::new(db_pool.clone())),
                contacts: Arc::new(ContactRepository::new(db_pool.clone())),
                templates: Arc::new(TemplateRepository::new(db_pool.clone())),
                media: Arc::new(MediaRepository::new(db_pool.clone())),
            };
            (stores, Some(db_pool))
        }
    };

    // Provider client and engine
    let client = Arc::new(
        WhatsAppClient::new(&config.whatsapp).context("Failed to create WhatsApp client")?,
    );
    let metrics = Arc::new(EngineMetrics::new().context("Failed to register metrics")?);

    let dispatcher =
        MessageDispatcher::new(client.clone(), stores.campaigns.clone(), metrics.clone())
            .with_pacing(config.dispatch.pacing())
            .with_message_type(config.whatsapp.message_type.clone());
    let poller = DeliveryReportPoller::new(
        client,
        stores.campaigns.clone(),
        metrics.clone(),
        config.reports.clone(),
    );
    let controller = CampaignController::new(stores, dispatcher, poller);
    let context = config.whatsapp.session_context();

    // Start scheduler
    let scheduler_handle = {
        let scheduler = CampaignScheduler::new(controller.clone(), context.clone())
            .with_config(&config.scheduler, &config.reports);
        tokio::spawn(async move {
            scheduler.run().await;
        })
    };

    // Start API server
    let api_handle = {
        let state = AppState {
            controller,
            context,
            metrics,
            db_pool,
        };
        let app = create_router(state, &config.api);
        let addr = format!("{}:{}", config.server.bind_address, config.api.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind API server on {}", addr))?;
        info!("Starting API server on {}", addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API server error: {}", e);
            }
        })
    };

    info!("WaPulse server started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // In-flight send loops are not drained
    scheduler_handle.abort();
    api_handle.abort();

    info!("WaPulse server shutdown complete");

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},wapulse=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_level(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}

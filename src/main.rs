mod config;
mod error;
mod handlers;
mod models;
mod server;
mod services;

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::sync::Arc;

use config::Config;
use handlers::{AnalysisHandler, MealLogger, TrackerService};
use server::{create_router, AppState};
use services::{Database, GatewayClient, ImageStore, NutritionGateway, TrackerStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init();

    log::info!("🚀 Starting Nutrition Tracker...");

    let config = Config::from_env()?;

    if config.gateway.api_key.is_none() {
        log::warn!("⚠️ AI_GATEWAY_API_KEY not set, food analysis requests will fail");
    }

    let db: Arc<dyn TrackerStore> = Arc::new(Database::new(&config.database_url).await?);
    log::info!("✅ PostgreSQL database initialized");

    let gateway: Arc<dyn NutritionGateway> = Arc::new(GatewayClient::new(config.gateway.clone())?);
    log::info!(
        "✅ AI gateway client initialized with model: {} (timeout {:?}, retries {})",
        config.gateway.model,
        config.gateway.timeout,
        config.gateway.max_retries
    );

    let analysis = Arc::new(AnalysisHandler::new(gateway));
    let state = AppState {
        analysis: analysis.clone(),
        meals: Arc::new(MealLogger::new(analysis, db.clone())),
        tracker: Arc::new(TrackerService::new(db)),
        images: Arc::new(ImageStore::new(
            config.image_dir.clone(),
            config.public_base_url.clone(),
        )),
    };
    log::info!("🖼️ Storing images in {}", config.image_dir.display());

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    log::info!("🌐 Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            log::info!("🛑 Shutting down...");
        })
        .await?;

    Ok(())
}

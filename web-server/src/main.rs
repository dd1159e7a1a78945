//! MACE Risk Web Server
//!
//! Form and JSON API over the risk pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     MACE RISK WEB                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────┐  ┌─────────────────────────┐ │
//! │  │  HTML     │  │  JSON     │  │  Explanation images     │ │
//! │  │  form     │  │  API      │  │  (GET /explanations/id) │ │
//! │  └─────┬─────┘  └─────┬─────┘  └────────────┬────────────┘ │
//! │        └──────────────┼──────────────────────┘              │
//! │                       ▼  spawn_blocking                     │
//! │                ┌──────────────┐                             │
//! │                │ RiskPipeline │ (model loaded once)         │
//! │                └──────────────┘                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod error;
mod handlers;
mod views;


use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use mace_risk_core::RiskPipeline;
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "mace_risk_web=debug,mace_risk_core=info,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    tracing::info!("{} v{} starting...", mace_risk_core::constants::APP_NAME, env!("CARGO_PKG_VERSION"));
    tracing::info!("Model: {}", config.pipeline.model_path.display());
    tracing::info!("Images: {} ({:?})", config.pipeline.image_dir.display(), config.pipeline.image_mode);

    // Load the model once; it is shared read-only by every request
    let pipeline = RiskPipeline::from_config(&config.pipeline)
        .context("Failed to initialize risk pipeline")?;

    // Build application state
    let state = AppState {
        pipeline: Arc::new(pipeline),
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RiskPipeline>,
    pub config: config::Config,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    // Browser form
    let form_routes = Router::new()
        .route("/", get(handlers::form::index))
        .route("/assess", post(handlers::form::assess))
        .route("/explanations/:id", get(handlers::images::get));

    // JSON API
    let api_routes = Router::new()
        .route("/health", get(handlers::health::check))
        .route("/api/v1/assess", post(handlers::api::assess))
        .route("/api/v1/schema", get(handlers::api::schema));

    Router::new()
        .merge(form_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

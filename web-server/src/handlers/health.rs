//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    timestamp: i64,
    model_type: String,
    model_checksum: String,
    layout_hash: String,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    let meta = state.pipeline.model_metadata();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        timestamp: chrono::Utc::now().timestamp(),
        model_type: meta.model_type.clone(),
        model_checksum: meta.checksum.clone(),
        layout_hash: format!("{:08x}", state.pipeline.schema().layout_hash()),
    })
}

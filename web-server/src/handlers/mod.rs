//! HTTP handlers

pub mod health;
pub mod form;
pub mod api;
pub mod images;

use std::sync::Arc;

use mace_risk_core::{RiskPipeline, RiskResult};

use crate::{AppError, AppResult};

/// Run pipeline work on the blocking pool; rendering and PNG encoding are CPU bound
pub async fn run_pipeline<T, F>(pipeline: &Arc<RiskPipeline>, work: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(&RiskPipeline) -> RiskResult<T> + Send + 'static,
{
    let pipeline = Arc::clone(pipeline);
    let result = tokio::task::spawn_blocking(move || work(&pipeline)).await?;
    result.map_err(AppError::from)
}

//! Explanation image handler

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};

use crate::{AppError, AppResult, AppState};

/// Serve a published explanation image
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = id.strip_suffix(".png").unwrap_or(&id);

    let path = state
        .pipeline
        .store()
        .resolve(id)
        .ok_or_else(|| AppError::NotFound("Explanation image not found".to_string()))?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        tracing::warn!("Image {} vanished before it was served: {}", id, e);
        AppError::NotFound("Explanation image not found".to_string())
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        bytes,
    ))
}

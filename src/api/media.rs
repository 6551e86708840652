//! Audio files, the style list and the legacy pose endpoint

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use super::{ApiError, ApiState};
use crate::Error;
use crate::delivery::StyleId;

/// Build media router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/audio/{filename}", get(get_audio))
        .route("/api/styles", get(list_styles))
        .route("/api/pose", get(pose_compat).post(pose_compat))
        .with_state(state)
}

/// Serve a synthesized artifact
async fn get_audio(
    State(state): State<Arc<ApiState>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    match state.audio_store.read(&filename).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "audio/wav")], bytes).into_response()),
        Err(Error::NotFound(_)) => Err(ApiError::NotFound),
        Err(e) => {
            tracing::error!(file = %filename, error = %e, "failed to read audio");
            Err(ApiError::Internal(e.to_string()))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StylePreset {
    pub label: &'static str,
    pub id: u32,
}

#[derive(Debug, Serialize)]
pub struct StylesResponse {
    pub styles: Vec<StylePreset>,
}

/// Allowed voice styles in display order
async fn list_styles() -> Json<StylesResponse> {
    Json(StylesResponse {
        styles: StyleId::ALL
            .into_iter()
            .map(|s| StylePreset {
                label: s.label(),
                id: s.id(),
            })
            .collect(),
    })
}

/// Always-neutral head pose, kept for older frontends
async fn pose_compat() -> Json<serde_json::Value> {
    Json(serde_json::json!({"head": {"y": 0.0}}))
}

//! Chat endpoints: text or recorded voice in, reply text and audio out

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::post;
use axum::{Json, Router};

use super::{ApiError, ApiState};
use crate::Error;
use crate::coordinator::{ChatReply, ChatRequest, Engine};
use crate::stream::preview;
use crate::stt::AudioUpload;

/// Largest accepted upload (voice recordings)
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Build chat router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/text", post(text_to_reply))
        .route("/api/voice", post(voice_to_reply))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Interpret a form flag; accepts `1,true,t,yes,y,on` in any case
#[must_use]
pub fn parse_bool(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        matches!(
            v.trim().to_lowercase().as_str(),
            "1" | "true" | "t" | "yes" | "y" | "on"
        )
    })
}

/// Fields shared by both chat endpoints
#[derive(Debug, Default)]
struct ChatForm {
    text: Option<String>,
    style_id: Option<String>,
    auto_mode: Option<String>,
    pose_mode: Option<String>,
    chat_engine: Option<String>,
    file: Option<AudioUpload>,
}

impl ChatForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let filename = field.file_name().unwrap_or("audio.webm").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                form.file = Some(AudioUpload {
                    bytes: bytes.to_vec(),
                    filename,
                    content_type,
                });
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            match name.as_str() {
                "text" => form.text = Some(value),
                "styleId" => form.style_id = Some(value),
                "autoMode" => form.auto_mode = Some(value),
                "poseMode" => form.pose_mode = Some(value),
                "chatEngine" => form.chat_engine = Some(value),
                other => tracing::debug!(field = other, "ignoring unknown form field"),
            }
        }

        Ok(form)
    }

    /// Build a coordinator request for `text`
    fn into_request(self, text: String) -> ChatRequest {
        ChatRequest {
            text,
            style_id: self.style_id.and_then(|s| s.trim().parse().ok()),
            auto: parse_bool(self.auto_mode.as_deref()),
            pose: parse_bool(self.pose_mode.as_deref()),
            engine: Engine::parse(self.chat_engine.as_deref()),
        }
    }
}

async fn reply(state: &ApiState, request: ChatRequest) -> Result<Json<ChatReply>, ApiError> {
    let engine = request.engine.label();
    state.coordinator.handle(request).await.map(Json).map_err(|e| {
        tracing::error!(engine, error = %e, "reply synthesis failed");
        ApiError::Synthesis(e.to_string())
    })
}

/// Text in, reply out
async fn text_to_reply(
    State(state): State<Arc<ApiState>>,
    multipart: Multipart,
) -> Result<Json<ChatReply>, ApiError> {
    let mut form = ChatForm::read(multipart).await?;

    let text = form.text.take().unwrap_or_default().trim().to_string();
    if text.is_empty() {
        return Err(ApiError::EmptyText);
    }

    reply(&state, form.into_request(text)).await
}

/// Recorded speech in, reply out
async fn voice_to_reply(
    State(state): State<Arc<ApiState>>,
    multipart: Multipart,
) -> Result<Json<ChatReply>, ApiError> {
    let recognizer = state
        .recognizer
        .clone()
        .ok_or(ApiError::RecognizerNotConfigured)?;

    let mut form = ChatForm::read(multipart).await?;
    let audio = form
        .file
        .take()
        .ok_or_else(|| ApiError::BadRequest("音声ファイルがありません".to_string()))?;
    if audio.bytes.is_empty() {
        return Err(ApiError::NoSpeech);
    }

    let text = match recognizer.transcribe(audio).await {
        Ok(text) => text,
        Err(Error::NoSpeech) => {
            tracing::warn!("voice input had no recognizable speech");
            return Err(ApiError::NoSpeech);
        }
        Err(e) => {
            tracing::error!(error = %e, "speech recognition failed");
            return Err(ApiError::RecognizerUnreachable(e.to_string()));
        }
    };
    tracing::info!(text = %preview(&text), "voice recognized");

    reply(&state, form.into_request(text)).await
}

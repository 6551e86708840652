//! HTTP API server for the avatar relay

pub mod chat;
pub mod health;
pub mod media;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::coordinator::Coordinator;
use crate::stt::SpeechRecognizer;
use crate::tts::AudioStore;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Coordinator>,
    /// Present only when speech recognition is configured
    pub recognizer: Option<Arc<dyn SpeechRecognizer>>,
    pub audio_store: AudioStore,
}

/// Errors surfaced to HTTP callers
#[derive(Debug)]
pub enum ApiError {
    /// Request carried no usable text
    EmptyText,
    BadRequest(String),
    /// Speech was recorded but nothing was recognized
    NoSpeech,
    /// Recognition service could not be reached
    RecognizerUnreachable(String),
    /// No recognizer configured
    RecognizerNotConfigured,
    /// Reply audio could not be produced
    Synthesis(String),
    NotFound,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        let (status, error) = match self {
            Self::EmptyText => (StatusCode::BAD_REQUEST, "テキストが空です".to_string()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NoSpeech => (StatusCode::BAD_REQUEST, "音声を認識できませんでした".to_string()),
            Self::RecognizerUnreachable(e) => (
                StatusCode::BAD_GATEWAY,
                format!("音声認識サービスに接続できません: {e}"),
            ),
            Self::RecognizerNotConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                "音声認識が設定されていません".to_string(),
            ),
            Self::Synthesis(e) => (StatusCode::BAD_GATEWAY, format!("COEIROINK error: {e}")),
            Self::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            Self::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e),
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .merge(chat::router(state.clone()))
        .merge(media::router(state))
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
}

/// HTTP server wrapping the API router
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: ApiState, port: u16) -> Self {
        Self {
            state: Arc::new(state),
            port,
        }
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(
            port = self.port,
            speech_recognition = self.state.recognizer.is_some(),
            audio_dir = %self.state.audio_store.dir().display(),
            "API server listening"
        );

        axum::serve(listener, router(self.state))
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

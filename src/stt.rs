//! Speech-to-text (STT) processing

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

const SERVICE: &str = "stt";

/// Request timeout for one transcription
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Response from an OpenAI-compatible transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Recorded audio uploaded by a client
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

/// Turns recorded speech into text
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Transcribe `audio`
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSpeech`] when nothing intelligible was heard, or a
    /// transport/status error when the service cannot be reached
    async fn transcribe(&self, audio: AudioUpload) -> Result<String>;
}

/// Collapse a raw transcript to one trimmed line
fn clean_transcript(raw: &str) -> String {
    raw.replace(['\r', '\n'], " ").trim().to_string()
}

/// Transcribes speech with an OpenAI-compatible `/audio/transcriptions` endpoint
pub struct WhisperRecognizer {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    language: String,
}

impl WhisperRecognizer {
    /// Create a new recognizer
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        model: String,
        language: String,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            language,
        })
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperRecognizer {
    async fn transcribe(&self, audio: AudioUpload) -> Result<String> {
        tracing::debug!(audio_bytes = audio.bytes.len(), model = %self.model, "starting transcription");

        let file = reqwest::multipart::Part::bytes(audio.bytes)
            .file_name(audio.filename)
            .mime_str(&audio.content_type)?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let mut request = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "transcription request failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| Error::Malformed {
            service: SERVICE,
            detail: e.to_string(),
        })?;

        let text = clean_transcript(&result.text);
        if text.is_empty() {
            return Err(Error::NoSpeech);
        }

        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }
}

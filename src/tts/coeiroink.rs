//! COEIROINK `/v1/synthesis` client

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{AudioArtifact, AudioStore, Synthesizer};
use crate::delivery::{Prosody, ProsodyOverrides, StyleId};
use crate::{Error, Result};

const SERVICE: &str = "coeiroink";

/// Request timeout for one synthesis call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisRequest<'a> {
    speaker_uuid: &'a str,
    style_id: StyleId,
    text: &'a str,
    #[serde(flatten)]
    prosody: Prosody,
}

/// Synthesizes speech with a COEIROINK engine and stores the result
pub struct CoeiroinkClient {
    client: reqwest::Client,
    base_url: String,
    speaker_uuid: String,
    store: AudioStore,
}

impl CoeiroinkClient {
    /// Create a new COEIROINK client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: &str, speaker_uuid: impl Into<String>, store: AudioStore) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            speaker_uuid: speaker_uuid.into(),
            store,
        })
    }

    /// Storage the client writes artifacts to
    #[must_use]
    pub const fn store(&self) -> &AudioStore {
        &self.store
    }

    /// Fetch raw WAV bytes for `text`
    async fn request_audio(
        &self,
        text: &str,
        style: StyleId,
        overrides: Option<&ProsodyOverrides>,
    ) -> Result<Vec<u8>> {
        if self.speaker_uuid.trim().is_empty() {
            return Err(Error::Tts("speaker identity is not configured".to_string()));
        }

        let request = SynthesisRequest {
            speaker_uuid: &self.speaker_uuid,
            style_id: style,
            text,
            prosody: Prosody::default().merged(overrides).clamped(),
        };

        let response = self
            .client
            .post(format!("{}/v1/synthesis", self.base_url))
            .header(reqwest::header::ACCEPT, "audio/wav")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Synthesizer for CoeiroinkClient {
    async fn synthesize(
        &self,
        text: &str,
        style: StyleId,
        overrides: Option<&ProsodyOverrides>,
    ) -> Result<AudioArtifact> {
        let audio = self.request_audio(text, style, overrides).await?;
        let artifact = self.store.write(&audio).await?;
        tracing::debug!(
            file = %artifact.filename,
            style = style.id(),
            bytes = audio.len(),
            "synthesized audio"
        );
        Ok(artifact)
    }

    async fn discard(&self, artifact: &AudioArtifact) {
        self.store.remove(artifact).await;
    }
}

//! Ollama `/api/generate` client, blocking and streaming
//!
//! Ollama streams newline-delimited JSON: one `{"response": "...", "done": bool}`
//! object per line. Lines that fail to decode are skipped, and a connection
//! that closes without a `done` line simply ends the stream.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use super::{LanguageModel, StreamingModel, TokenChunk, TokenStream};
use crate::{Error, Result};

const SERVICE: &str = "ollama";

/// Connect timeout for every request
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct StreamLine {
    #[serde(default)]
    response: Option<serde_json::Value>,
    #[serde(default)]
    done: bool,
}

/// Decode one NDJSON line of a streamed generation.
///
/// Returns `None` for blank or undecodable lines.
#[must_use]
pub fn parse_stream_line(line: &str) -> Option<TokenChunk> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let parsed: StreamLine = serde_json::from_str(line).ok()?;
    let text = match parsed.response {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    Some(TokenChunk {
        text,
        done: parsed.done,
    })
}

/// HTTP client for a local Ollama server
#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Bind this client to a model with a per-request timeout
    #[must_use]
    pub fn model(&self, model: impl Into<String>, timeout: Duration) -> OllamaModel {
        OllamaModel {
            client: self.clone(),
            model: model.into(),
            timeout,
        }
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "Ollama API error");
        Err(Error::Status {
            service: SERVICE,
            status: status.as_u16(),
            body,
        })
    }

    /// Generate a complete reply
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the body is not a generate response
    pub async fn generate(&self, model: &str, prompt: &str, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .post(self.generate_url())
            .timeout(timeout)
            .json(&GenerateRequest {
                model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, model, "Ollama request failed");
                e
            })?;

        let response = Self::check_status(response).await?;
        let parsed: GenerateResponse = response.json().await.map_err(|e| Error::Malformed {
            service: SERVICE,
            detail: e.to_string(),
        })?;

        Ok(parsed.response.trim().to_string())
    }

    /// Open a streamed generation.
    ///
    /// No overall timeout is applied here; callers bound the stream.
    ///
    /// # Errors
    ///
    /// Returns error if the connection fails or the server rejects the request
    pub async fn generate_stream(&self, model: &str, prompt: &str) -> Result<TokenStream> {
        let response = self
            .client
            .post(self.generate_url())
            .json(&GenerateRequest {
                model,
                prompt,
                stream: true,
            })
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        Ok(ndjson_chunks(response.bytes_stream().map_err(Error::from)))
    }
}

/// Split a byte stream into NDJSON lines and decode them into chunks
fn ndjson_chunks<S, B>(bytes: S) -> TokenStream
where
    S: futures::Stream<Item = Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    struct LineState<S> {
        bytes: S,
        buf: Vec<u8>,
        finished: bool,
    }

    let state = LineState {
        bytes: bytes.boxed(),
        buf: Vec::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(pos) = st.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = st.buf.drain(..=pos).collect();
                if let Some(chunk) = parse_stream_line(&String::from_utf8_lossy(&line)) {
                    return Some((Ok(chunk), st));
                }
                continue;
            }

            if st.finished {
                // Trailing line without a newline
                if st.buf.is_empty() {
                    return None;
                }
                let line = std::mem::take(&mut st.buf);
                if let Some(chunk) = parse_stream_line(&String::from_utf8_lossy(&line)) {
                    return Some((Ok(chunk), st));
                }
                return None;
            }

            match st.bytes.next().await {
                Some(Ok(data)) => st.buf.extend_from_slice(data.as_ref()),
                Some(Err(e)) => {
                    st.finished = true;
                    st.buf.clear();
                    return Some((Err(e), st));
                }
                None => st.finished = true,
            }
        }
    })
    .boxed()
}

/// An Ollama client bound to one model
#[derive(Clone)]
pub struct OllamaModel {
    client: OllamaClient,
    model: String,
    timeout: Duration,
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, contents: &[String]) -> Result<String> {
        let prompt = contents.join("\n");
        self.client.generate(&self.model, &prompt, self.timeout).await
    }
}

#[async_trait]
impl StreamingModel for OllamaModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        self.client.generate_stream(&self.model, prompt).await
    }
}

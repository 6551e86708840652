//! Streaming reply pipeline
//!
//! Tokens from the local model are segmented into sentences as they arrive.
//! A producer stage pulls tokens and pushes finished sentences through a
//! bounded channel; a consumer stage synthesizes them one at a time. Both
//! stages are joined inside the caller's task, so dropping the request
//! future stops the model stream and any pending synthesis together.
//!
//! If any segment fails to synthesize, or no segment produced audio at all,
//! the partial audio is thrown away and the whole reply (or its placeholder)
//! is synthesized once instead.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};

use crate::delivery::{ProsodyOverrides, StyleId};
use crate::history::{Conversation, ReplySource};
use crate::llm::StreamingModel;
use crate::segment::split_sentences;
use crate::tts::{AudioArtifact, Synthesizer};

/// Reply text when the local model cannot be reached at all
pub const UNREACHABLE_REPLY: &str = "…（ローカルLLMに接続できませんでした）";

/// Reply text when the model answered with nothing
pub const EMPTY_REPLY: &str = "（空の応答）";

/// Default bound on the whole token stream
pub const DEFAULT_STREAM_DEADLINE: Duration = Duration::from_secs(300);

/// Sentences buffered between the token and synthesis stages
const SENTENCE_CHANNEL_SIZE: usize = 8;

/// Longest text excerpt put in a log line
const LOG_PREVIEW_CHARS: usize = 40;

/// Short excerpt of `text` for log fields
pub(crate) fn preview(text: &str) -> String {
    text.chars().take(LOG_PREVIEW_CHARS).collect()
}

/// Why per-segment audio was not used as-is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// At least one segment failed to synthesize
    SegmentFail,
    /// The reply produced no audio at all
    NoAudio,
}

impl FallbackReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SegmentFail => "segment_fail",
            Self::NoAudio => "no_audio",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one streamed reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingResult {
    pub full_text: String,
    /// In sentence order, or a single whole-reply artifact after fallback
    pub artifacts: Vec<AudioArtifact>,
    pub fallback_reason: Option<FallbackReason>,
}

impl StreamingResult {
    /// Urls of the audio artifacts, in playback order
    #[must_use]
    pub fn audio_urls(&self) -> Vec<String> {
        self.artifacts.iter().map(AudioArtifact::url).collect()
    }
}

/// Voice settings applied to every segment of one reply
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Voice {
    pub style: StyleId,
    pub overrides: Option<ProsodyOverrides>,
}

/// One reply to stream
#[derive(Debug, Clone, Copy)]
pub struct ReplyRequest<'a> {
    /// Engine name for logs
    pub engine: &'a str,
    pub user_text: &'a str,
    /// Extra prompt rules appended after the system instruction
    pub extra_rules: &'a str,
    pub voice: Voice,
}

/// Drives a token stream through segmentation and synthesis
pub struct StreamOrchestrator {
    synthesizer: Arc<dyn Synthesizer>,
    deadline: Duration,
}

impl StreamOrchestrator {
    #[must_use]
    pub fn new(synthesizer: Arc<dyn Synthesizer>, deadline: Duration) -> Self {
        Self { synthesizer, deadline }
    }

    /// Stream a reply from `model`, synthesize it and record the exchange
    pub async fn stream_reply(
        &self,
        model: &dyn StreamingModel,
        conversation: &Conversation,
        request: ReplyRequest<'_>,
    ) -> StreamingResult {
        let prompt = conversation.local_prompt(request.user_text, request.extra_rules).await;
        tracing::info!(engine = request.engine, model = model.model_id(), "streaming start");

        let (sentence_tx, sentence_rx) = mpsc::channel::<String>(SENTENCE_CHANNEL_SIZE);
        let deadline = Instant::now() + self.deadline;
        let (mut full_text, (mut artifacts, segment_failed)) = tokio::join!(
            produce_sentences(model, &prompt, deadline, sentence_tx),
            self.synthesize_sentences(request, sentence_rx),
        );

        let mut reason = segment_failed.then_some(FallbackReason::SegmentFail);

        if full_text.trim().is_empty() {
            full_text = EMPTY_REPLY.to_string();
        }
        if artifacts.is_empty() && reason.is_none() {
            reason = Some(FallbackReason::NoAudio);
        }

        if let Some(why) = reason {
            tracing::warn!(
                engine = request.engine,
                reason = %why,
                "falling back to whole-reply synthesis"
            );
            for artifact in artifacts.drain(..) {
                self.synthesizer.discard(&artifact).await;
            }
            match self.synthesize(&full_text, request.voice).await {
                Ok(artifact) => {
                    tracing::warn!(
                        engine = request.engine,
                        file = %artifact.filename,
                        "whole-reply synthesis ok"
                    );
                    artifacts.push(artifact);
                }
                Err(e) => {
                    tracing::error!(
                        engine = request.engine,
                        reason = %why,
                        error = %e,
                        "whole-reply synthesis failed"
                    );
                }
            }
        }

        conversation.record(request.user_text, &full_text, ReplySource::Local).await;

        tracing::info!(
            engine = request.engine,
            text_len = full_text.chars().count(),
            segments = artifacts.len(),
            reason = reason.map(FallbackReason::as_str),
            "streaming done"
        );

        StreamingResult {
            full_text,
            artifacts,
            fallback_reason: reason,
        }
    }

    async fn synthesize(&self, text: &str, voice: Voice) -> crate::Result<AudioArtifact> {
        self.synthesizer
            .synthesize(text, voice.style, voice.overrides.as_ref())
            .await
    }

    /// Consumer stage: synthesize sentences in arrival order.
    ///
    /// Returns the artifacts and whether any sentence failed.
    async fn synthesize_sentences(
        &self,
        request: ReplyRequest<'_>,
        mut sentences: mpsc::Receiver<String>,
    ) -> (Vec<AudioArtifact>, bool) {
        let mut artifacts = Vec::new();
        let mut failed = false;

        while let Some(sentence) = sentences.recv().await {
            match self.synthesize(&sentence, request.voice).await {
                Ok(artifact) => {
                    tracing::info!(
                        engine = request.engine,
                        text = %preview(&sentence),
                        file = %artifact.filename,
                        "segment synthesized"
                    );
                    artifacts.push(artifact);
                }
                Err(e) => {
                    tracing::warn!(
                        engine = request.engine,
                        text = %preview(&sentence),
                        error = %e,
                        "segment synthesis failed"
                    );
                    failed = true;
                }
            }
        }

        (artifacts, failed)
    }
}

/// Producer stage: pull tokens, emit completed sentences, flush the rest.
///
/// Returns the full reply text. Any way the stream ends (final marker,
/// close, error, deadline) leads to the same flush.
async fn produce_sentences(
    model: &dyn StreamingModel,
    prompt: &str,
    deadline: Instant,
    sentences: mpsc::Sender<String>,
) -> String {
    let mut full_text = String::new();
    let mut buffer = String::new();

    let mut tokens = match timeout_at(deadline, model.stream(prompt)).await {
        Ok(Ok(tokens)) => tokens,
        Ok(Err(e)) => {
            tracing::warn!(model = model.model_id(), error = %e, "could not open token stream");
            return UNREACHABLE_REPLY.to_string();
        }
        Err(_) => {
            tracing::warn!(model = model.model_id(), "token stream did not open before deadline");
            return UNREACHABLE_REPLY.to_string();
        }
    };

    loop {
        let chunk = match timeout_at(deadline, tokens.next()).await {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(e))) => {
                tracing::warn!(model = model.model_id(), error = %e, "token stream failed");
                if full_text.is_empty() {
                    full_text = UNREACHABLE_REPLY.to_string();
                }
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(model = model.model_id(), "token stream deadline reached");
                break;
            }
        };

        if !chunk.text.is_empty() {
            full_text.push_str(&chunk.text);
            buffer.push_str(&chunk.text);
            let (completed, rest) = split_sentences(&buffer);
            buffer = rest;
            for sentence in completed {
                if sentences.send(sentence).await.is_err() {
                    return full_text;
                }
            }
        }

        if chunk.done {
            break;
        }
    }

    let last = buffer.trim();
    if !last.is_empty() {
        tracing::debug!(text = %preview(last), "flushing final segment");
        let _ = sentences.send(last.to_string()).await;
    }

    full_text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_have_wire_names() {
        assert_eq!(FallbackReason::SegmentFail.to_string(), "segment_fail");
        assert_eq!(FallbackReason::NoAudio.as_str(), "no_audio");
    }

    #[test]
    fn preview_counts_characters() {
        let long = "あ".repeat(100);
        assert_eq!(preview(&long).chars().count(), LOG_PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }
}

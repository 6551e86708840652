//! Per-request chat logic
//!
//! Picks the engine, resolves delivery parameters, produces the reply and
//! its audio, and attaches a head-motion timeline.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::delivery::{ProsodyOverrides, Selector, StyleId};
use crate::history::{Conversation, ReplySource};
use crate::llm::{LanguageModel, StreamingModel};
use crate::pose::{PoseGenerator, PoseTimeline};
use crate::stream::{
    DEFAULT_STREAM_DEADLINE, FallbackReason, ReplyRequest, StreamOrchestrator, Voice, preview,
};
use crate::tts::Synthesizer;
use crate::{Error, Result};

/// Cloud reply when the model answered with nothing
pub const CLOUD_EMPTY_REPLY: &str = "ごめん、返答を作れなかった。";

/// Cloud reply when the model could not be reached
pub const CLOUD_FAILURE_REPLY: &str =
    "ごめん、AIモデルとのお話に失敗しちゃった。コンソールでログを確認してみて。もしかしてAPIキーが違うかも？";

/// Extra rules for the small local chat model
pub const SMALL_MODEL_RULES: &str =
    "\n出力ルール: 簡潔にし過ぎず、3〜6文で自然に。 友達感覚で喋って。 です・ます調は極力使わないように。\n";

/// Which backend answers a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Engine {
    /// Full reply from the cloud model
    #[default]
    Cloud,
    /// Streamed reply from the large local chat model
    Local,
    /// Streamed reply from the small local chat model
    LocalSmall,
}

impl Engine {
    /// Interpret the `chatEngine` form field; unknown values mean cloud
    #[must_use]
    pub fn parse(flag: Option<&str>) -> Self {
        match flag.map(|f| f.trim().to_lowercase()).as_deref() {
            Some("local" | "local12") => Self::Local,
            Some("local4" | "local-4b" | "local4b") => Self::LocalSmall,
            _ => Self::Cloud,
        }
    }

    /// Name used in logs
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Local => "local",
            Self::LocalSmall => "local4",
        }
    }

    #[must_use]
    pub const fn is_local(self) -> bool {
        !matches!(self, Self::Cloud)
    }
}

/// One chat request after input parsing
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Trimmed, non-empty user text
    pub text: String,
    /// Caller-chosen style id (manual mode)
    pub style_id: Option<i64>,
    /// Derive delivery parameters automatically
    pub auto: bool,
    /// Generate a head-motion timeline
    pub pose: bool,
    pub engine: Engine,
}

/// Audio for the reply: one url (cloud) or one per segment (local)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AudioField {
    Single(String),
    Segments(Vec<String>),
}

/// Synthesis settings echoed back to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TtsSummary {
    #[serde(rename = "styleId")]
    pub style_id: StyleId,
    /// Present in auto mode only
    #[serde(flatten)]
    pub overrides: Option<ProsodyOverrides>,
}

/// Everything a chat endpoint returns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub text: String,
    pub audio: AudioField,
    pub auto: bool,
    pub tts: TtsSummary,
    pub pose: PoseTimeline,
    /// Text the reply answered (the transcript for voice requests)
    pub stt: String,
    #[serde(skip)]
    pub fallback_reason: Option<FallbackReason>,
}

/// Language-model and synthesis backends used by the coordinator
pub struct Backends {
    pub cloud: Arc<dyn LanguageModel>,
    pub local_chat: Arc<dyn StreamingModel>,
    pub local_chat_small: Arc<dyn StreamingModel>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

/// Handles chat requests against the shared conversation
pub struct Coordinator {
    backends: Backends,
    selector: Selector,
    pose: PoseGenerator,
    conversation: Arc<Conversation>,
    orchestrator: StreamOrchestrator,
    default_style: StyleId,
}

impl Coordinator {
    #[must_use]
    pub fn new(
        backends: Backends,
        selector: Selector,
        pose: PoseGenerator,
        conversation: Arc<Conversation>,
    ) -> Self {
        let orchestrator =
            StreamOrchestrator::new(Arc::clone(&backends.synthesizer), DEFAULT_STREAM_DEADLINE);
        Self {
            backends,
            selector,
            pose,
            conversation,
            orchestrator,
            default_style: StyleId::default(),
        }
    }

    /// Style used in manual mode when the caller gives none
    #[must_use]
    pub const fn default_style(mut self, style: StyleId) -> Self {
        self.default_style = style;
        self
    }

    /// Bound on a streamed local reply
    #[must_use]
    pub fn stream_deadline(mut self, deadline: Duration) -> Self {
        self.orchestrator =
            StreamOrchestrator::new(Arc::clone(&self.backends.synthesizer), deadline);
        self
    }

    /// The shared conversation
    #[must_use]
    pub const fn conversation(&self) -> &Arc<Conversation> {
        &self.conversation
    }

    /// Answer one request.
    ///
    /// # Errors
    ///
    /// Only synthesis failures reach the caller: the cloud reply could not be
    /// synthesized, or every local segment failed and so did the whole-reply
    /// fallback. A local placeholder reply that cannot be voiced still
    /// answers with text and no audio.
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatReply> {
        let engine = request.engine;
        tracing::info!(engine = engine.label(), auto = request.auto, "processing request");

        let (text, audio, voice, fallback_reason) = if engine.is_local() {
            self.local_reply(&request).await?
        } else {
            self.cloud_reply(&request).await?
        };

        let pose = if request.pose || request.auto {
            self.pose.generate(&request.text).await
        } else {
            PoseTimeline::still()
        };

        Ok(ChatReply {
            text,
            audio,
            auto: request.auto,
            tts: TtsSummary {
                style_id: voice.style,
                overrides: voice.overrides,
            },
            pose,
            stt: request.text,
            fallback_reason,
        })
    }

    /// Manual-mode voice: caller style if allowed, else the default
    fn manual_voice(&self, style_id: Option<i64>) -> Voice {
        Voice {
            style: style_id.and_then(StyleId::from_id).unwrap_or(self.default_style),
            overrides: None,
        }
    }

    async fn auto_voice(&self, text: &str) -> Voice {
        let params = self.selector.select(text).await;
        tracing::info!(style = params.style_id.id(), reason = %params.reason, "auto delivery");
        Voice {
            style: params.style_id,
            overrides: Some(params.overrides()),
        }
    }

    async fn cloud_reply(
        &self,
        request: &ChatRequest,
    ) -> Result<(String, AudioField, Voice, Option<FallbackReason>)> {
        let engine = request.engine.label();
        let contents = self.conversation.cloud_contents(&request.text).await;

        tracing::info!(engine, model = self.backends.cloud.model_id(), "full reply start");
        let reply = match self.backends.cloud.complete(&contents).await {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => CLOUD_EMPTY_REPLY.to_string(),
            Err(e) => {
                tracing::error!(engine, error = %e, "cloud reply failed");
                CLOUD_FAILURE_REPLY.to_string()
            }
        };
        tracing::info!(
            engine,
            user = %preview(&request.text),
            reply = %preview(&reply),
            "full reply done"
        );
        self.conversation.record(&request.text, &reply, ReplySource::Cloud).await;

        let voice = if request.auto {
            self.auto_voice(&reply).await
        } else {
            self.manual_voice(request.style_id)
        };

        let artifact = self
            .backends
            .synthesizer
            .synthesize(&reply, voice.style, voice.overrides.as_ref())
            .await
            .map_err(|e| {
                tracing::error!(engine, error = %e, "synthesis failed");
                e
            })?;

        Ok((reply, AudioField::Single(artifact.url()), voice, None))
    }

    async fn local_reply(
        &self,
        request: &ChatRequest,
    ) -> Result<(String, AudioField, Voice, Option<FallbackReason>)> {
        let voice = if request.auto {
            self.auto_voice(&request.text).await
        } else {
            self.manual_voice(request.style_id)
        };

        let (model, extra_rules) = match request.engine {
            Engine::LocalSmall => (&self.backends.local_chat_small, SMALL_MODEL_RULES),
            _ => (&self.backends.local_chat, ""),
        };

        let result = self
            .orchestrator
            .stream_reply(
                &**model,
                &self.conversation,
                ReplyRequest {
                    engine: request.engine.label(),
                    user_text: &request.text,
                    extra_rules,
                    voice,
                },
            )
            .await;

        if result.artifacts.is_empty()
            && result.fallback_reason == Some(FallbackReason::SegmentFail)
        {
            return Err(Error::Tts(
                "every segment and the whole-reply fallback failed to synthesize".to_string(),
            ));
        }

        let audio = AudioField::Segments(result.audio_urls());
        Ok((result.full_text, audio, voice, result.fallback_reason))
    }
}

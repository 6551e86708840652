//! Auto-mode delivery selection
//!
//! An ordered chain of estimators is tried in turn. Each attempt either
//! yields a JSON object with a valid `styleId`, which wins, or the chain
//! moves on. When every estimator is exhausted the style comes from
//! keywords in the text. Whatever the source, numeric fields are clamped,
//! so [`Selector::select`] cannot fail.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};

use super::{DeliveryParameters, StyleId, style_for_keywords};
use crate::Result;
use crate::llm::LanguageModel;

/// Instructions for the voice-director estimators
pub const VOICE_DIRECTOR_PROMPT: &str = "あなたはTTS音声監督。ユーザー発話の感情・文脈から、以下のJSONだけを厳密に出力して。
- styleId: 次の集合のいずれかだけ [1,7,40,41,42,43,44,45,46,47]
- speedScale: 0.7〜1.4 の小数
- volumeScale: 0.8〜1.3 の小数
- pitchScale: -0.3〜0.3 の小数
- intonationScale: 0.8〜1.6 の小数
- prePhonemeLength: 0.05〜0.15 の小数
- postPhonemeLength: 0.35〜0.7 の小数
- outputSamplingRate: 24000 または 48000
- reason: 50字以内の短い説明（ログ用）

出力は JSON オブジェクト1個のみ。説明や前置きは一切なし。";

const UTTERANCE_LABEL: &str = "ユーザー発話:";

/// Reason recorded when nothing better is available
const HEURISTIC_REASON: &str = "推定で選択";

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Pull a single JSON object out of model output.
///
/// Accepts a bare object, or one wrapped in a Markdown fence or prose.
#[must_use]
pub fn extract_json_object(raw: &str) -> Option<Map<String, Value>> {
    let trimmed = raw.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str(trimmed) {
        return Some(map);
    }
    let candidate = JSON_OBJECT.find(trimmed)?;
    match serde_json::from_str(candidate.as_str()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// One link of the estimator chain
#[async_trait]
pub trait Estimator: Send + Sync {
    /// Estimator name for logging
    fn name(&self) -> &'static str;

    /// Reason to record when the estimator omits one
    fn default_reason(&self) -> &'static str {
        HEURISTIC_REASON
    }

    /// Ask the estimator for raw output describing the delivery
    ///
    /// # Errors
    ///
    /// Returns error if the backing model cannot be reached
    async fn estimate(&self, text: &str) -> Result<String>;
}

/// Primary estimator: the local model, prompt and utterance in one string
pub struct LocalEstimator {
    model: Arc<dyn LanguageModel>,
}

impl LocalEstimator {
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Estimator for LocalEstimator {
    fn name(&self) -> &'static str {
        "local"
    }

    fn default_reason(&self) -> &'static str {
        "ollama-gemma 推定"
    }

    async fn estimate(&self, text: &str) -> Result<String> {
        let prompt = format!("{VOICE_DIRECTOR_PROMPT}\n{UTTERANCE_LABEL}{text}");
        self.model.complete(&[prompt]).await
    }
}

/// Secondary estimator: the cloud model, prompt and utterance as two parts
pub struct CloudEstimator {
    model: Arc<dyn LanguageModel>,
}

impl CloudEstimator {
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Estimator for CloudEstimator {
    fn name(&self) -> &'static str {
        "cloud"
    }

    async fn estimate(&self, text: &str) -> Result<String> {
        let contents = [
            VOICE_DIRECTOR_PROMPT.to_string(),
            format!("{UTTERANCE_LABEL}{text}"),
        ];
        self.model.complete(&contents).await
    }
}

/// Chooses delivery parameters for auto mode
#[derive(Default)]
pub struct Selector {
    estimators: Vec<Box<dyn Estimator>>,
}

impl Selector {
    /// Create a selector with no estimators (keywords only)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an estimator to the end of the chain
    #[must_use]
    pub fn with_estimator(mut self, estimator: Box<dyn Estimator>) -> Self {
        self.estimators.push(estimator);
        self
    }

    /// Number of estimators before the keyword fallback
    #[must_use]
    pub fn len(&self) -> usize {
        self.estimators.len()
    }

    /// Whether only the keyword fallback is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.estimators.is_empty()
    }

    /// Select delivery parameters for `text`
    pub async fn select(&self, text: &str) -> DeliveryParameters {
        // Numeric fields for the keyword fallback come from the last attempt only
        let mut last_object = Map::new();

        for estimator in &self.estimators {
            let raw = match estimator.estimate(text).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(estimator = estimator.name(), error = %e, "estimator failed, trying next");
                    last_object = Map::new();
                    continue;
                }
            };

            let Some(object) = extract_json_object(&raw) else {
                tracing::warn!(estimator = estimator.name(), "estimator output is not a JSON object, trying next");
                last_object = Map::new();
                continue;
            };

            if let Some(style) = object.get("styleId").and_then(StyleId::from_json) {
                let params = DeliveryParameters::from_object(style, &object, estimator.default_reason());
                tracing::info!(
                    estimator = estimator.name(),
                    style = style.id(),
                    reason = %params.reason,
                    "delivery parameters selected"
                );
                return params;
            }

            tracing::warn!(
                estimator = estimator.name(),
                style = ?object.get("styleId"),
                "estimator chose an unsupported style, trying next"
            );
            last_object = object;
        }

        let style = style_for_keywords(text);
        let params = DeliveryParameters::from_object(style, &last_object, HEURISTIC_REASON);
        tracing::info!(style = style.id(), "delivery style resolved from keywords");
        params
    }
}

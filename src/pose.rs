//! Avatar head-motion timelines

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::delivery::extract_json_object;
use crate::llm::LanguageModel;

/// Instructions for the pose model
pub const POSE_TIMELINE_PROMPT: &str = "あなたは3Dアバターのモーション生成AIです。JSONのみ出力してください。
形式: {\"head\":{\"timeline\":[[t,y], ...]}} tは0..1昇順、yは-0.6..0.6(ラジアン)。
終端は0付近に戻す。説明は一切不要。
";

const MAX_ANGLE: f64 = 0.6;

/// Final keypoints farther than this from zero get closed at zero
const REST_TOLERANCE: f64 = 0.05;

/// A `[t, y]` pair: normalized time and head yaw in radians
pub type Keypoint = [f64; 2];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadTimeline {
    pub timeline: Vec<Keypoint>,
}

/// Head-motion timeline returned with every reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseTimeline {
    pub head: HeadTimeline,
}

impl PoseTimeline {
    fn from_keypoints(timeline: Vec<Keypoint>) -> Self {
        Self {
            head: HeadTimeline { timeline },
        }
    }

    /// Motionless timeline used when pose generation is off
    #[must_use]
    pub fn still() -> Self {
        Self::from_keypoints(vec![[0.0, 0.0], [1.0, 0.0]])
    }

    /// Gentle nod used when the model gives nothing usable
    #[must_use]
    pub fn fallback() -> Self {
        Self::from_keypoints(vec![[0.0, 0.0], [0.25, 0.15], [0.6, -0.1], [1.0, 0.0]])
    }

    /// Clean up model output into a valid timeline
    ///
    /// Returns `None` when no usable keypoint remains.
    #[must_use]
    pub fn from_model_output(raw: &str) -> Option<Self> {
        let object = extract_json_object(raw)?;
        let points = object.get("head")?.get("timeline")?.as_array()?;

        let mut timeline: Vec<Keypoint> = points.iter().filter_map(keypoint).collect();
        if timeline.is_empty() {
            return None;
        }
        timeline.sort_by(|a, b| a[0].total_cmp(&b[0]));

        if let Some(&[t, y]) = timeline.last()
            && y.abs() > REST_TOLERANCE
        {
            if t < 1.0 {
                timeline.push([1.0, 0.0]);
            } else if let Some(last) = timeline.last_mut() {
                last[1] = 0.0;
            }
        }

        Some(Self::from_keypoints(timeline))
    }
}

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// A two-element numeric array, clamped into range
fn keypoint(value: &Value) -> Option<Keypoint> {
    match value.as_array()?.as_slice() {
        [t, y] => Some([
            number(t)?.clamp(0.0, 1.0),
            number(y)?.clamp(-MAX_ANGLE, MAX_ANGLE),
        ]),
        _ => None,
    }
}

/// Asks a model for a head-motion timeline
pub struct PoseGenerator {
    model: Arc<dyn LanguageModel>,
}

impl PoseGenerator {
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Timeline for `text`; never fails
    pub async fn generate(&self, text: &str) -> PoseTimeline {
        let prompt = format!("{POSE_TIMELINE_PROMPT}ユーザー発話:{text}");
        match self.model.complete(&[prompt]).await {
            Ok(raw) => PoseTimeline::from_model_output(&raw).unwrap_or_else(|| {
                tracing::warn!(model = self.model.model_id(), "pose output unusable, using fallback");
                PoseTimeline::fallback()
            }),
            Err(e) => {
                tracing::warn!(model = self.model.model_id(), error = %e, "pose generation failed, using fallback");
                PoseTimeline::fallback()
            }
        }
    }
}

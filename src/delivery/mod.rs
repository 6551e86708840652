//! Speech delivery parameters
//!
//! Voice style and prosody settings sent to the synthesis engine, plus the
//! auto-mode [`Selector`] that derives them from conversation text.

mod keywords;
mod selector;

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use keywords::style_for_keywords;
pub use selector::{
    CloudEstimator, Estimator, LocalEstimator, Selector, VOICE_DIRECTOR_PROMPT, extract_json_object,
};

/// Voice styles the avatar speaker is allowed to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum StyleId {
    #[default]
    Normal,
    Earnest,
    Cheerful,
    Pouty,
    Dejected,
    Whisper,
    Special,
    Smug,
    Numunumu,
    PajamaParty,
}

impl StyleId {
    /// Every allowed style, in the order presented to users
    pub const ALL: [Self; 10] = [
        Self::Normal,
        Self::Earnest,
        Self::Cheerful,
        Self::Smug,
        Self::Pouty,
        Self::Dejected,
        Self::Whisper,
        Self::Special,
        Self::Numunumu,
        Self::PajamaParty,
    ];

    /// Engine-side numeric style id
    #[must_use]
    pub const fn id(self) -> u32 {
        match self {
            Self::Normal => 1,
            Self::Earnest => 7,
            Self::Cheerful => 40,
            Self::Pouty => 41,
            Self::Dejected => 42,
            Self::Whisper => 43,
            Self::Special => 44,
            Self::Smug => 45,
            Self::Numunumu => 46,
            Self::PajamaParty => 47,
        }
    }

    /// Display label shown in the style picker
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Normal => "のーまる",
            Self::Earnest => "いっしょうけんめい",
            Self::Cheerful => "ごきげん",
            Self::Pouty => "ふくれっつら",
            Self::Dejected => "しょんぼり",
            Self::Whisper => "ないしょばなし",
            Self::Special => "ひっさつわざ",
            Self::Smug => "どやがお",
            Self::Numunumu => "ぬむぬむ",
            Self::PajamaParty => "ぱじゃまぱーてぃー",
        }
    }

    /// Look up an allowed style by numeric id
    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| i64::from(s.id()) == id)
    }

    /// Interpret a JSON value as a style id.
    ///
    /// Only integral numbers are accepted; strings and booleans are not.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    pub fn from_json(value: &Value) -> Option<Self> {
        let id = match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?,
            _ => return None,
        };
        Self::from_id(id)
    }
}

impl From<StyleId> for u32 {
    fn from(style: StyleId) -> Self {
        style.id()
    }
}

impl TryFrom<u32> for StyleId {
    type Error = String;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        Self::from_id(i64::from(id)).ok_or_else(|| format!("unsupported style id {id}"))
    }
}

/// Closed range and fallback for one numeric prosody field
struct Bounded {
    key: &'static str,
    range: RangeInclusive<f64>,
    default: f64,
}

impl Bounded {
    const fn new(key: &'static str, lo: f64, hi: f64, default: f64) -> Self {
        Self {
            key,
            range: lo..=hi,
            default,
        }
    }

    /// Read and clamp the field from a loosely-typed JSON object
    fn read(&self, object: &Map<String, Value>) -> f64 {
        object
            .get(self.key)
            .and_then(loose_f64)
            .map_or(self.default, |v| self.clamp(v))
    }

    fn clamp(&self, value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(*self.range.start(), *self.range.end())
        } else {
            self.default
        }
    }
}

const SPEED: Bounded = Bounded::new("speedScale", 0.7, 1.4, 1.0);
const VOLUME: Bounded = Bounded::new("volumeScale", 0.8, 1.3, 1.0);
const PITCH: Bounded = Bounded::new("pitchScale", -0.3, 0.3, 0.0);
const INTONATION: Bounded = Bounded::new("intonationScale", 0.8, 1.6, 1.0);
const PRE_PHONEME: Bounded = Bounded::new("prePhonemeLength", 0.05, 0.15, 0.1);
const POST_PHONEME: Bounded = Bounded::new("postPhonemeLength", 0.35, 0.7, 0.5);

/// Default output sampling rate
pub const DEFAULT_SAMPLING_RATE: u32 = 24_000;

/// The only alternative output sampling rate
pub const HIGH_SAMPLING_RATE: u32 = 48_000;

/// Numbers, or strings holding numbers, as f64
fn loose_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Collapse any rate other than 48 kHz to 24 kHz
#[must_use]
#[allow(clippy::float_cmp)]
pub fn coerce_sampling_rate(value: Option<&Value>) -> u32 {
    let rate = value.and_then(loose_f64).map(f64::trunc);
    if rate == Some(f64::from(HIGH_SAMPLING_RATE)) {
        HIGH_SAMPLING_RATE
    } else {
        DEFAULT_SAMPLING_RATE
    }
}

/// Prosody settings sent with every synthesis request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prosody {
    pub speed_scale: f64,
    pub volume_scale: f64,
    pub pitch_scale: f64,
    pub intonation_scale: f64,
    pub pre_phoneme_length: f64,
    pub post_phoneme_length: f64,
    pub output_sampling_rate: u32,
}

impl Default for Prosody {
    fn default() -> Self {
        Self {
            speed_scale: SPEED.default,
            volume_scale: VOLUME.default,
            pitch_scale: PITCH.default,
            intonation_scale: INTONATION.default,
            pre_phoneme_length: PRE_PHONEME.default,
            post_phoneme_length: POST_PHONEME.default,
            output_sampling_rate: DEFAULT_SAMPLING_RATE,
        }
    }
}

impl Prosody {
    /// Build from a loosely-typed estimator object, clamping every field
    #[must_use]
    pub fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            speed_scale: SPEED.read(object),
            volume_scale: VOLUME.read(object),
            pitch_scale: PITCH.read(object),
            intonation_scale: INTONATION.read(object),
            pre_phoneme_length: PRE_PHONEME.read(object),
            post_phoneme_length: POST_PHONEME.read(object),
            output_sampling_rate: coerce_sampling_rate(object.get("outputSamplingRate")),
        }
    }

    /// Apply caller overrides field-by-field
    #[must_use]
    pub fn merged(self, overrides: Option<&ProsodyOverrides>) -> Self {
        let Some(o) = overrides else {
            return self;
        };
        Self {
            speed_scale: o.speed_scale.unwrap_or(self.speed_scale),
            volume_scale: o.volume_scale.unwrap_or(self.volume_scale),
            pitch_scale: o.pitch_scale.unwrap_or(self.pitch_scale),
            intonation_scale: o.intonation_scale.unwrap_or(self.intonation_scale),
            pre_phoneme_length: o.pre_phoneme_length.unwrap_or(self.pre_phoneme_length),
            post_phoneme_length: o.post_phoneme_length.unwrap_or(self.post_phoneme_length),
            output_sampling_rate: o.output_sampling_rate.unwrap_or(self.output_sampling_rate),
        }
    }

    /// Clamp every field into its declared range
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            speed_scale: SPEED.clamp(self.speed_scale),
            volume_scale: VOLUME.clamp(self.volume_scale),
            pitch_scale: PITCH.clamp(self.pitch_scale),
            intonation_scale: INTONATION.clamp(self.intonation_scale),
            pre_phoneme_length: PRE_PHONEME.clamp(self.pre_phoneme_length),
            post_phoneme_length: POST_PHONEME.clamp(self.post_phoneme_length),
            output_sampling_rate: if self.output_sampling_rate == HIGH_SAMPLING_RATE {
                HIGH_SAMPLING_RATE
            } else {
                DEFAULT_SAMPLING_RATE
            },
        }
    }
}

/// Partial prosody; unset fields keep the synthesis defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProsodyOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intonation_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_phoneme_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_phoneme_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_sampling_rate: Option<u32>,
}

impl From<Prosody> for ProsodyOverrides {
    fn from(p: Prosody) -> Self {
        Self {
            speed_scale: Some(p.speed_scale),
            volume_scale: Some(p.volume_scale),
            pitch_scale: Some(p.pitch_scale),
            intonation_scale: Some(p.intonation_scale),
            pre_phoneme_length: Some(p.pre_phoneme_length),
            post_phoneme_length: Some(p.post_phoneme_length),
            output_sampling_rate: Some(p.output_sampling_rate),
        }
    }
}

/// A complete, range-checked set of delivery parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryParameters {
    pub style_id: StyleId,
    #[serde(flatten)]
    pub prosody: Prosody,
    /// Short explanation from the estimator, for logs
    #[serde(skip)]
    pub reason: String,
}

impl DeliveryParameters {
    /// Build from an estimator object with an already-resolved style
    #[must_use]
    pub fn from_object(style_id: StyleId, object: &Map<String, Value>, fallback_reason: &str) -> Self {
        let reason = object
            .get("reason")
            .map(|r| match r {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| fallback_reason.to_string());

        Self {
            style_id,
            prosody: Prosody::from_object(object),
            reason,
        }
    }

    /// Prosody as a full override set for the synthesis client
    #[must_use]
    pub fn overrides(&self) -> ProsodyOverrides {
        self.prosody.into()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn style_ids_round_trip_through_numbers() {
        for style in StyleId::ALL {
            assert_eq!(StyleId::from_id(i64::from(style.id())), Some(style));
        }
        assert_eq!(StyleId::from_id(999), None);
        assert_eq!(StyleId::from_id(0), None);
    }

    #[test]
    fn style_from_json_only_accepts_integral_numbers() {
        assert_eq!(StyleId::from_json(&json!(40)), Some(StyleId::Cheerful));
        assert_eq!(StyleId::from_json(&json!(43.0)), Some(StyleId::Whisper));
        assert_eq!(StyleId::from_json(&json!(43.5)), None);
        assert_eq!(StyleId::from_json(&json!("40")), None);
        assert_eq!(StyleId::from_json(&json!(null)), None);
        assert_eq!(StyleId::from_json(&json!(999)), None);
    }

    #[test]
    fn style_serializes_as_number() {
        let value = serde_json::to_value(StyleId::PajamaParty).unwrap();
        assert_eq!(value, json!(47));
        let parsed: StyleId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(parsed, StyleId::Dejected);
        assert!(serde_json::from_value::<StyleId>(json!(2)).is_err());
    }

    #[test]
    fn prosody_fields_are_clamped() {
        let p = Prosody::from_object(&object(json!({
            "speedScale": 9.0,
            "volumeScale": 0.1,
            "pitchScale": -1,
            "intonationScale": 1.2,
            "prePhonemeLength": 1,
            "postPhonemeLength": 0.0,
        })));
        assert!((p.speed_scale - 1.4).abs() < f64::EPSILON);
        assert!((p.volume_scale - 0.8).abs() < f64::EPSILON);
        assert!((p.pitch_scale + 0.3).abs() < f64::EPSILON);
        assert!((p.intonation_scale - 1.2).abs() < f64::EPSILON);
        assert!((p.pre_phoneme_length - 0.15).abs() < f64::EPSILON);
        assert!((p.post_phoneme_length - 0.35).abs() < f64::EPSILON);
    }

    #[test]
    fn non_numeric_fields_use_defaults() {
        let p = Prosody::from_object(&object(json!({
            "speedScale": "fast",
            "volumeScale": [1],
            "pitchScale": "0.2",
        })));
        assert!((p.speed_scale - 1.0).abs() < f64::EPSILON);
        assert!((p.volume_scale - 1.0).abs() < f64::EPSILON);
        assert!((p.pitch_scale - 0.2).abs() < f64::EPSILON);
        assert_eq!(p, Prosody { pitch_scale: 0.2, ..Prosody::default() });
    }

    #[test]
    fn sampling_rate_collapses_to_24k() {
        assert_eq!(coerce_sampling_rate(Some(&json!(48000))), 48_000);
        assert_eq!(coerce_sampling_rate(Some(&json!("48000"))), 48_000);
        assert_eq!(coerce_sampling_rate(Some(&json!(44100))), 24_000);
        assert_eq!(coerce_sampling_rate(Some(&json!("high"))), 24_000);
        assert_eq!(coerce_sampling_rate(None), 24_000);
    }

    #[test]
    fn overrides_take_precedence_field_by_field() {
        let overrides = ProsodyOverrides {
            speed_scale: Some(1.3),
            output_sampling_rate: Some(48_000),
            ..ProsodyOverrides::default()
        };
        let merged = Prosody::default().merged(Some(&overrides));
        assert!((merged.speed_scale - 1.3).abs() < f64::EPSILON);
        assert_eq!(merged.output_sampling_rate, 48_000);
        assert!((merged.post_phoneme_length - 0.5).abs() < f64::EPSILON);
        assert_eq!(Prosody::default().merged(None), Prosody::default());
    }

    #[test]
    fn clamped_fixes_out_of_range_overrides() {
        let wild = Prosody {
            speed_scale: f64::NAN,
            volume_scale: 5.0,
            output_sampling_rate: 16_000,
            ..Prosody::default()
        };
        let fixed = wild.clamped();
        assert!((fixed.speed_scale - 1.0).abs() < f64::EPSILON);
        assert!((fixed.volume_scale - 1.3).abs() < f64::EPSILON);
        assert_eq!(fixed.output_sampling_rate, 24_000);
    }

    #[test]
    fn delivery_parameters_serialize_flat() {
        let params = DeliveryParameters::from_object(StyleId::Whisper, &Map::new(), "default");
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["styleId"], json!(43));
        assert_eq!(value["outputSamplingRate"], json!(24000));
        assert!(value.get("reason").is_none());
        assert_eq!(params.reason, "default");
    }
}

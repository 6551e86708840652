//! Last-resort style choice from keywords in the text

use super::StyleId;

/// Keyword buckets, checked in order; first hit wins
const BUCKETS: &[(StyleId, &[&str])] = &[
    (StyleId::Whisper, &["内緒", "ないしょ", "ひそひそ"]),
    (StyleId::Cheerful, &["楽しい", "最高", "嬉", "やった", "草", "ｗ"]),
    (StyleId::Dejected, &["しょんぼり", "悲", "落ち込", "ごめん"]),
    (StyleId::Pouty, &["怒", "ムカ", "ふくれ"]),
];

/// Pick a style from keywords in `text`, or the default style
#[must_use]
pub fn style_for_keywords(text: &str) -> StyleId {
    let lowered = text.to_lowercase();
    BUCKETS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lowered.contains(w)))
        .map_or_else(StyleId::default, |(style, _)| *style)
}

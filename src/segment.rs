//! Sentence segmentation for streamed model output
//!
//! Model tokens arrive in arbitrary fragments. The streaming pipeline keeps
//! an accumulating buffer and calls [`split_sentences`] after every token to
//! peel off the sentences that are already complete.

/// Characters that close a sentence (Japanese and Latin punctuation)
pub const SENTENCE_TERMINATORS: [char; 7] = ['。', '！', '？', '．', '.', '!', '?'];

/// Whether `c` ends a sentence
#[must_use]
pub fn is_terminator(c: char) -> bool {
    SENTENCE_TERMINATORS.contains(&c)
}

/// Split `buffer` into completed sentences and the unterminated remainder.
///
/// Each sentence keeps its terminator and is trimmed; sentences that trim
/// to nothing are dropped. The remainder is everything after the last
/// terminator with leading whitespace removed.
///
/// ```
/// use avatar_relay::segment::split_sentences;
///
/// let (done, rest) = split_sentences("こんにちは。元気?");
/// assert_eq!(done, vec!["こんにちは。", "元気?"]);
/// assert_eq!(rest, "");
/// ```
#[must_use]
pub fn split_sentences(buffer: &str) -> (Vec<String>, String) {
    let mut sentences = Vec::new();
    let mut start = 0;

    for (idx, ch) in buffer.char_indices() {
        if is_terminator(ch) {
            let end = idx + ch.len_utf8();
            let sentence = buffer[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = end;
        }
    }

    (sentences, buffer[start..].trim_start().to_string())
}

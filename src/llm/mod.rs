//! Language-model collaborators
//!
//! Two backends: a cloud model (Gemini) answering whole replies, and a local
//! Ollama server that can also stream tokens.

mod gemini;
mod ollama;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use gemini::GeminiClient;
pub use ollama::{OllamaClient, OllamaModel, parse_stream_line};

use crate::Result;

/// One decoded chunk of a streamed completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenChunk {
    /// Incremental text (may be empty)
    pub text: String,
    /// Whether the backend marked this as the last chunk
    pub done: bool,
}

impl TokenChunk {
    /// A non-final chunk carrying `text`
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
        }
    }
}

/// A finite, non-restartable sequence of completion chunks.
///
/// The stream may end without a `done` chunk; closing is end of stream.
pub type TokenStream = BoxStream<'static, Result<TokenChunk>>;

/// A model that answers a prompt with one complete reply
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, for logging
    fn model_id(&self) -> &str;

    /// Generate a completion for the given prompt parts
    ///
    /// # Errors
    ///
    /// Returns error if the backend is unreachable or answers with a
    /// non-success status or undecodable body
    async fn complete(&self, contents: &[String]) -> Result<String>;
}

/// A model that streams its reply token by token
#[async_trait]
pub trait StreamingModel: Send + Sync {
    /// Model identifier, for logging
    fn model_id(&self) -> &str;

    /// Open a token stream for `prompt`
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be opened
    async fn stream(&self, prompt: &str) -> Result<TokenStream>;
}

//! Relay configuration
//!
//! Every setting resolves as environment variable, then TOML file, then
//! built-in default.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

pub use file::{RelayConfigFile, config_file_path, load_config_file};

use crate::delivery::StyleId;
use crate::history::DEFAULT_HISTORY_TURNS;
use crate::stream::DEFAULT_STREAM_DEADLINE;
use crate::{Error, Result};

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OLLAMA_MODEL: &str = "gemma3:4b";
const DEFAULT_CHAT_MODEL: &str = "gemma3:12b";
const DEFAULT_CHAT_MODEL_SMALL: &str = "gemma3:4b";
const DEFAULT_COEIROINK_URL: &str = "http://127.0.0.1:50032";
const DEFAULT_SPEAKER_UUID: &str = "292ea286-3d5f-f1cc-157c-66462a6a9d08";
const DEFAULT_STT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_STT_MODEL: &str = "whisper-1";
const DEFAULT_STT_LANGUAGE: &str = "ja";
const DEFAULT_PORT: u16 = 8000;

/// Cloud model settings
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
}

/// Local model settings
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    /// Model for delivery and pose estimation
    pub model: String,
    pub chat_model: String,
    pub chat_model_small: String,
}

/// Speech synthesis settings
#[derive(Debug, Clone)]
pub struct CoeiroinkConfig {
    pub base_url: String,
    pub speaker_uuid: String,
    /// Style used in manual mode when the caller gives none
    pub style_id: StyleId,
}

/// Speech recognition settings
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub language: String,
}

impl SttConfig {
    /// A recognizer is usable with a key, or with a self-hosted endpoint
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some() || self.base_url.trim_end_matches('/') != DEFAULT_STT_BASE_URL
    }
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub output_dir: PathBuf,
}

/// Conversation settings
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    pub history_turns: usize,
    pub stream_deadline: Duration,
}

/// Complete relay configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub ollama: OllamaConfig,
    pub coeiroink: CoeiroinkConfig,
    pub stt: SttConfig,
    pub server: ServerConfig,
    pub conversation: ConversationConfig,
    /// Root for the chat log and default audio output
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from the environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if `GEMINI_API_KEY` is not set anywhere
    pub fn load() -> Result<Self> {
        Self::from_parts(load_config_file(), |key| std::env::var(key).ok(), default_data_dir())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the Gemini API key is missing
    pub fn from_parts(
        fc: RelayConfigFile,
        env: impl Fn(&str) -> Option<String>,
        data_dir: PathBuf,
    ) -> Result<Self> {
        // Blank values count as unset
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let api_key = var("GEMINI_API_KEY")
            .or(fc.gemini.api_key)
            .ok_or_else(|| Error::Config("GEMINI_API_KEY is not set".to_string()))?;
        let gemini = GeminiConfig {
            api_key: SecretString::from(api_key),
            model: var("GEMINI_MODEL")
                .or(fc.gemini.model)
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: var("GEMINI_BASE_URL")
                .or(fc.gemini.base_url)
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
        };

        let ollama = OllamaConfig {
            base_url: var("OLLAMA_BASE_URL")
                .or(fc.ollama.base_url)
                .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string()),
            model: var("OLLAMA_MODEL")
                .or(fc.ollama.model)
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            chat_model: var("OLLAMA_MODEL_CHAT")
                .or(fc.ollama.chat_model)
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            chat_model_small: var("OLLAMA_MODEL_CHAT_4B")
                .or(fc.ollama.chat_model_small)
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL_SMALL.to_string()),
        };

        let style_raw = var("COEIROINK_STYLE_ID").or_else(|| fc.coeiroink.style_id.map(|id| id.to_string()));
        let coeiroink = CoeiroinkConfig {
            base_url: var("COEIROINK_URL")
                .or(fc.coeiroink.base_url)
                .unwrap_or_else(|| DEFAULT_COEIROINK_URL.to_string()),
            speaker_uuid: var("COEIROINK_SPEAKER_UUID")
                .or(fc.coeiroink.speaker_uuid)
                .unwrap_or_else(|| DEFAULT_SPEAKER_UUID.to_string()),
            style_id: style_raw.as_deref().map_or_else(StyleId::default, parse_style_id),
        };

        let stt = SttConfig {
            base_url: var("STT_BASE_URL")
                .or(fc.stt.base_url)
                .unwrap_or_else(|| DEFAULT_STT_BASE_URL.to_string()),
            api_key: var("STT_API_KEY")
                .or_else(|| var("OPENAI_API_KEY"))
                .or(fc.stt.api_key)
                .map(SecretString::from),
            model: var("STT_MODEL")
                .or(fc.stt.model)
                .unwrap_or_else(|| DEFAULT_STT_MODEL.to_string()),
            language: var("STT_LANGUAGE")
                .or(fc.stt.language)
                .unwrap_or_else(|| DEFAULT_STT_LANGUAGE.to_string()),
        };

        let server = ServerConfig {
            port: var("RELAY_PORT")
                .or_else(|| var("PORT"))
                .and_then(|s| s.trim().parse().ok())
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            output_dir: var("RELAY_OUTPUT_DIR")
                .or(fc.server.output_dir)
                .map_or_else(|| data_dir.join("outputs").join("tts"), PathBuf::from),
        };

        let conversation = ConversationConfig {
            history_turns: var("RELAY_HISTORY_TURNS")
                .and_then(|s| s.trim().parse().ok())
                .or(fc.conversation.history_turns)
                .unwrap_or(DEFAULT_HISTORY_TURNS),
            stream_deadline: var("RELAY_STREAM_DEADLINE_SECS")
                .and_then(|s| s.trim().parse().ok())
                .or(fc.conversation.stream_deadline_secs)
                .map_or(DEFAULT_STREAM_DEADLINE, Duration::from_secs),
        };

        Ok(Self {
            gemini,
            ollama,
            coeiroink,
            stt,
            server,
            conversation,
            data_dir,
        })
    }

    /// Human-readable transcript of every exchange
    #[must_use]
    pub fn chat_log_path(&self) -> PathBuf {
        self.data_dir.join("chat_history.txt")
    }
}

/// Parse the default style id; anything unusable falls back to style 1
fn parse_style_id(raw: &str) -> StyleId {
    match raw.trim().parse::<i64>() {
        Ok(id) => StyleId::from_id(id).unwrap_or_else(|| {
            tracing::warn!(style_id = id, "COEIROINK_STYLE_ID is not an allowed style, using default");
            StyleId::default()
        }),
        Err(_) => {
            tracing::warn!(value = raw, "COEIROINK_STYLE_ID must be an integer, using default");
            StyleId::default()
        }
    }
}

/// Data directory (`~/.local/share/avatar-relay` on Linux)
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("avatar-relay"))
}

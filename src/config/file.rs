//! TOML configuration file loading
//!
//! Supports `~/.config/avatar-relay/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct RelayConfigFile {
    #[serde(default)]
    pub gemini: GeminiFileConfig,

    #[serde(default)]
    pub ollama: OllamaFileConfig,

    #[serde(default)]
    pub coeiroink: CoeiroinkFileConfig,

    #[serde(default)]
    pub stt: SttFileConfig,

    #[serde(default)]
    pub server: ServerFileConfig,

    #[serde(default)]
    pub conversation: ConversationFileConfig,
}

/// Cloud model configuration
#[derive(Debug, Default, Deserialize)]
pub struct GeminiFileConfig {
    pub api_key: Option<String>,
    /// Model identifier (e.g. "gemini-2.5-flash")
    pub model: Option<String>,
    pub base_url: Option<String>,
}

/// Local model configuration
#[derive(Debug, Default, Deserialize)]
pub struct OllamaFileConfig {
    pub base_url: Option<String>,
    /// Model for delivery and pose estimation
    pub model: Option<String>,
    /// Large chat model
    pub chat_model: Option<String>,
    /// Small chat model
    pub chat_model_small: Option<String>,
}

/// Speech synthesis engine configuration
#[derive(Debug, Default, Deserialize)]
pub struct CoeiroinkFileConfig {
    pub base_url: Option<String>,
    pub speaker_uuid: Option<String>,
    pub style_id: Option<i64>,
}

/// Speech recognition configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,
    /// Directory synthesized audio is written to
    pub output_dir: Option<String>,
}

/// Conversation configuration
#[derive(Debug, Default, Deserialize)]
pub struct ConversationFileConfig {
    /// Round trips visible to the model
    pub history_turns: Option<usize>,
    /// Bound on one streamed reply, in seconds
    pub stream_deadline_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `RelayConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> RelayConfigFile {
    let Some(path) = config_file_path() else {
        return RelayConfigFile::default();
    };

    if !path.exists() {
        return RelayConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content).unwrap_or_else(|e| {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config file, using defaults"
            );
            RelayConfigFile::default()
        }),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            RelayConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the contents are not valid TOML for the schema
pub fn parse_config(content: &str) -> crate::Result<RelayConfigFile> {
    let config = toml::from_str(content)?;
    Ok(config)
}

/// Return the config file path: `~/.config/avatar-relay/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("avatar-relay").join("config.toml"))
}

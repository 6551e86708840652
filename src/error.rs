//! Error types for the avatar relay

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the avatar relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credential or identity)
    #[error("configuration error: {0}")]
    Config(String),

    /// Collaborator answered with a non-success HTTP status
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Collaborator answered with something we could not interpret
    #[error("malformed {service} response: {detail}")]
    Malformed {
        service: &'static str,
        detail: String,
    },

    /// Collaborator did not answer in time
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Speech-to-text could not find any speech in the audio
    #[error("no speech detected")]
    NoSpeech,

    /// Requested resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

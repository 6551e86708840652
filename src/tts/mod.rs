//! Speech synthesis
//!
//! A [`Synthesizer`] turns one piece of text into an [`AudioArtifact`] on
//! disk. The production backend is a COEIROINK engine; artifacts are kept
//! in an [`AudioStore`] and served back under `/audio/<filename>`.

mod coeiroink;
mod store;

use std::path::PathBuf;

use async_trait::async_trait;

pub use coeiroink::CoeiroinkClient;
pub use store::AudioStore;

use crate::Result;
use crate::delivery::{ProsodyOverrides, StyleId};

/// Url prefix audio artifacts are served under
pub const AUDIO_ROUTE_PREFIX: &str = "/audio/";

/// A synthesized audio file, written once and never modified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    /// Bare file name, e.g. `reply_<uuid>.wav`
    pub filename: String,
    /// Location on disk
    pub path: PathBuf,
}

impl AudioArtifact {
    /// Url the artifact is served under
    #[must_use]
    pub fn url(&self) -> String {
        format!("{AUDIO_ROUTE_PREFIX}{}", self.filename)
    }
}

/// Text-to-speech backend
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` with the given style and optional prosody overrides
    ///
    /// # Errors
    ///
    /// Returns error if the backend is unreachable, misconfigured or
    /// answers with a non-success status
    async fn synthesize(
        &self,
        text: &str,
        style: StyleId,
        overrides: Option<&ProsodyOverrides>,
    ) -> Result<AudioArtifact>;

    /// Remove a previously produced artifact. Failures are ignored.
    async fn discard(&self, artifact: &AudioArtifact);
}

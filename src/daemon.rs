//! Daemon - the main relay service
//!
//! Wires configuration into the model clients, synthesizer, recognizer and
//! coordinator, then serves the HTTP API until interrupted.

use std::sync::Arc;
use std::time::Duration;

use crate::api::{ApiServer, ApiState};
use crate::coordinator::{Backends, Coordinator};
use crate::delivery::{CloudEstimator, LocalEstimator, Selector};
use crate::history::{ChatLog, Conversation, ConversationHistory, SYSTEM_INSTRUCTION};
use crate::llm::{GeminiClient, LanguageModel, OllamaClient};
use crate::pose::PoseGenerator;
use crate::stt::{SpeechRecognizer, WhisperRecognizer};
use crate::tts::{AudioStore, CoeiroinkClient};
use crate::{Config, Result};

/// Timeout for delivery and pose estimation calls
const ESTIMATOR_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for a non-streamed local reply
const LOCAL_REPLY_TIMEOUT: Duration = Duration::from_secs(120);

/// The relay daemon
pub struct Daemon {
    config: Config,
    port: u16,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub const fn new(config: Config, port: u16) -> Self {
        Self { config, port }
    }

    /// Build the synthesizer alone (used by `test-tts`)
    ///
    /// # Errors
    ///
    /// Returns error if the output directory cannot be created
    pub fn synthesizer(config: &Config) -> Result<CoeiroinkClient> {
        let store = AudioStore::open(&config.server.output_dir)?;
        CoeiroinkClient::new(&config.coeiroink.base_url, config.coeiroink.speaker_uuid.clone(), store)
    }

    /// Assemble all collaborators into API state
    ///
    /// # Errors
    ///
    /// Returns error if a client cannot be built or the output directory
    /// cannot be created
    pub fn build_state(&self) -> Result<ApiState> {
        let config = &self.config;

        let synthesizer = Arc::new(Self::synthesizer(config)?);
        let audio_store = synthesizer.store().clone();

        let cloud: Arc<dyn LanguageModel> = Arc::new(GeminiClient::new(
            &config.gemini.base_url,
            config.gemini.api_key.clone(),
            config.gemini.model.clone(),
        )?);

        let ollama = OllamaClient::new(&config.ollama.base_url)?;
        let director: Arc<dyn LanguageModel> =
            Arc::new(ollama.model(&config.ollama.model, ESTIMATOR_TIMEOUT));

        let selector = Selector::new()
            .with_estimator(Box::new(LocalEstimator::new(Arc::clone(&director))))
            .with_estimator(Box::new(CloudEstimator::new(Arc::clone(&cloud))));
        let estimators = selector.len();

        std::fs::create_dir_all(&config.data_dir)?;
        let conversation = Arc::new(Conversation::new(
            ConversationHistory::new(SYSTEM_INSTRUCTION, config.conversation.history_turns),
            Some(ChatLog::new(config.chat_log_path())),
        ));

        let backends = Backends {
            cloud,
            local_chat: Arc::new(ollama.model(&config.ollama.chat_model, LOCAL_REPLY_TIMEOUT)),
            local_chat_small: Arc::new(ollama.model(&config.ollama.chat_model_small, LOCAL_REPLY_TIMEOUT)),
            synthesizer,
        };

        let coordinator = Coordinator::new(backends, selector, PoseGenerator::new(director), conversation)
            .default_style(config.coeiroink.style_id)
            .stream_deadline(config.conversation.stream_deadline);

        let recognizer: Option<Arc<dyn SpeechRecognizer>> = if config.stt.is_enabled() {
            Some(Arc::new(WhisperRecognizer::new(
                &config.stt.base_url,
                config.stt.api_key.clone(),
                config.stt.model.clone(),
                config.stt.language.clone(),
            )?))
        } else {
            tracing::warn!("speech recognition not configured, /api/voice disabled");
            None
        };

        tracing::info!(
            cloud_model = %config.gemini.model,
            chat_model = %config.ollama.chat_model,
            chat_model_small = %config.ollama.chat_model_small,
            director_model = %config.ollama.model,
            estimators,
            style = config.coeiroink.style_id.id(),
            "relay initialized"
        );

        Ok(ApiState {
            coordinator: Arc::new(coordinator),
            recognizer,
            audio_store,
        })
    }

    /// Run the daemon until Ctrl-C or server failure
    ///
    /// # Errors
    ///
    /// Returns error if initialization fails or the server stops with an error
    pub async fn run(self) -> Result<()> {
        let state = self.build_state()?;
        let server = ApiServer::new(state, self.port).spawn();

        tokio::select! {
            result = server => {
                match result {
                    Ok(inner) => inner?,
                    Err(e) => tracing::error!(error = %e, "API server task failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
            }
        }

        Ok(())
    }
}

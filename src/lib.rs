//! Avatar Relay - voice and text conversation relay for a talking avatar
//!
//! This library provides the core functionality of the relay:
//! - Replies from a cloud model or a streamed local model
//! - Sentence segmentation and per-sentence speech synthesis
//! - Automatic delivery (voice style and prosody) selection
//! - Head-motion timelines for the avatar
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              HTTP API (text / voice)                 │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Coordinator                         │
//! │  Selector  │  Stream Orchestrator  │  Pose  │  STT   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Collaborators                        │
//! │   Gemini  │  Ollama  │  COEIROINK  │  Whisper        │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod delivery;
pub mod error;
pub mod history;
pub mod llm;
pub mod pose;
pub mod segment;
pub mod stream;
pub mod stt;
pub mod tts;

pub use config::Config;
pub use coordinator::{ChatReply, ChatRequest, Coordinator, Engine};
pub use daemon::Daemon;
pub use delivery::{DeliveryParameters, Selector, StyleId};
pub use error::{Error, Result};
pub use stream::{FallbackReason, StreamOrchestrator, StreamingResult};

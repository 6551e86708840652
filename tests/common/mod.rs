//! Shared test utilities: in-memory collaborators

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use avatar_relay::coordinator::{Backends, Coordinator};
use avatar_relay::delivery::{LocalEstimator, ProsodyOverrides, Selector, StyleId};
use avatar_relay::history::{Conversation, ConversationHistory};
use avatar_relay::llm::{LanguageModel, StreamingModel, TokenChunk, TokenStream};
use avatar_relay::pose::PoseGenerator;
use avatar_relay::stt::{AudioUpload, SpeechRecognizer};
use avatar_relay::tts::{AudioArtifact, Synthesizer};
use avatar_relay::{Error, Result};
use futures::StreamExt;

/// Language model answering every prompt with the same canned output
pub struct FakeModel {
    reply: Option<String>,
    pub prompts: Mutex<Vec<Vec<String>>>,
}

impl FakeModel {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<Vec<String>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    fn model_id(&self) -> &str {
        "fake"
    }

    async fn complete(&self, contents: &[String]) -> Result<String> {
        self.prompts.lock().unwrap().push(contents.to_vec());
        self.reply.clone().ok_or(Error::Timeout("fake"))
    }
}

/// One scripted item of a token stream
#[derive(Debug, Clone)]
pub enum Script {
    Token(&'static str),
    Done,
    Fail,
    /// Never yields again
    Hang,
}

/// Streaming model replaying a script
pub struct ScriptedStream {
    script: Option<Vec<Script>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedStream {
    pub fn new(script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            script: Some(script),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn tokens(tokens: &[&'static str]) -> Arc<Self> {
        Self::new(tokens.iter().map(|t| Script::Token(*t)).collect())
    }

    /// Stream that cannot even be opened
    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            script: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamingModel for ScriptedStream {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let Some(script) = self.script.clone() else {
            return Err(Error::Status {
                service: "ollama",
                status: 503,
                body: "down".to_string(),
            });
        };

        let hangs = matches!(script.last(), Some(Script::Hang));
        let items: Vec<Result<TokenChunk>> = script
            .into_iter()
            .filter_map(|item| match item {
                Script::Token(t) => Some(Ok(TokenChunk::text(t))),
                Script::Done => Some(Ok(TokenChunk {
                    text: String::new(),
                    done: true,
                })),
                Script::Fail => Some(Err(Error::Timeout("ollama"))),
                Script::Hang => None,
            })
            .collect();

        let stream = futures::stream::iter(items);
        if hangs {
            Ok(stream.chain(futures::stream::pending()).boxed())
        } else {
            Ok(stream.boxed())
        }
    }
}

/// Decides whether a synthesis call for some text fails
pub type FailWhen = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// One recorded synthesis call
#[derive(Debug, Clone, PartialEq)]
pub struct SynthCall {
    pub text: String,
    pub style: StyleId,
    pub overrides: Option<ProsodyOverrides>,
}

/// Synthesizer that records calls and hands out numbered artifacts
pub struct FakeSynthesizer {
    fail_when: FailWhen,
    pub calls: Mutex<Vec<SynthCall>>,
    pub discarded: Mutex<Vec<String>>,
}

impl FakeSynthesizer {
    pub fn ok() -> Arc<Self> {
        Self::failing_when(Box::new(|_| false))
    }

    pub fn always_failing() -> Arc<Self> {
        Self::failing_when(Box::new(|_| true))
    }

    pub fn failing_when(fail_when: FailWhen) -> Arc<Self> {
        Arc::new(Self {
            fail_when,
            calls: Mutex::new(Vec::new()),
            discarded: Mutex::new(Vec::new()),
        })
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|c| c.text.clone()).collect()
    }

    pub fn discarded(&self) -> Vec<String> {
        self.discarded.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        style: StyleId,
        overrides: Option<&ProsodyOverrides>,
    ) -> Result<AudioArtifact> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(SynthCall {
                text: text.to_string(),
                style,
                overrides: overrides.copied(),
            });
            calls.len()
        };

        if (self.fail_when)(text) {
            return Err(Error::Status {
                service: "coeiroink",
                status: 500,
                body: "engine error".to_string(),
            });
        }

        let filename = format!("reply_{index}.wav");
        Ok(AudioArtifact {
            path: PathBuf::from(&filename),
            filename,
        })
    }

    async fn discard(&self, artifact: &AudioArtifact) {
        self.discarded.lock().unwrap().push(artifact.filename.clone());
    }
}

/// Outcome a fake recognizer reports
#[derive(Debug, Clone)]
pub enum Heard {
    Text(&'static str),
    Nothing,
    Unreachable,
}

pub struct FakeRecognizer {
    heard: Heard,
    pub uploads: Mutex<Vec<AudioUpload>>,
}

impl FakeRecognizer {
    pub fn new(heard: Heard) -> Arc<Self> {
        Arc::new(Self {
            heard,
            uploads: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SpeechRecognizer for FakeRecognizer {
    async fn transcribe(&self, audio: AudioUpload) -> Result<String> {
        self.uploads.lock().unwrap().push(audio);
        match &self.heard {
            Heard::Text(t) => Ok((*t).to_string()),
            Heard::Nothing => Err(Error::NoSpeech),
            Heard::Unreachable => Err(Error::Timeout("stt")),
        }
    }
}

/// Fresh conversation with a short instruction and no chat log
pub fn conversation() -> Arc<Conversation> {
    Arc::new(Conversation::new(ConversationHistory::new("sys", 10), None))
}

/// Collaborators for a test coordinator
pub struct Fakes {
    pub cloud: Arc<FakeModel>,
    pub local: Arc<ScriptedStream>,
    pub local_small: Arc<ScriptedStream>,
    pub director: Arc<FakeModel>,
    pub synthesizer: Arc<FakeSynthesizer>,
}

impl Fakes {
    pub fn new() -> Self {
        Self {
            cloud: FakeModel::replying("やっほー！元気だよ。"),
            local: ScriptedStream::tokens(&["こん", "にちは。", "元気", "?"]),
            local_small: ScriptedStream::tokens(&["ちいさい", "モデル。"]),
            director: FakeModel::unreachable(),
            synthesizer: FakeSynthesizer::ok(),
        }
    }

    /// Coordinator over these fakes; the director model drives both the
    /// primary estimator and pose generation
    pub fn coordinator(&self, conversation: Arc<Conversation>) -> Coordinator {
        let director: Arc<dyn LanguageModel> = self.director.clone();
        let selector =
            Selector::new().with_estimator(Box::new(LocalEstimator::new(Arc::clone(&director))));
        Coordinator::new(
            Backends {
                cloud: self.cloud.clone(),
                local_chat: self.local.clone(),
                local_chat_small: self.local_small.clone(),
                synthesizer: self.synthesizer.clone(),
            },
            selector,
            PoseGenerator::new(director),
            conversation,
        )
    }
}

/// Build a multipart/form-data body from text fields and an optional file
pub fn multipart_body(
    boundary: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    if let Some((filename, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

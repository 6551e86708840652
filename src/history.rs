//! Conversation history shared by every request
//!
//! Entries accumulate without bound, but prompts only ever see the last
//! `2 * turns` entries behind a fixed system instruction.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Persona instruction placed at the head of every prompt
pub const SYSTEM_INSTRUCTION: &str = "あなたは私専用の会話パートナーです。
- 関西弁は禁止
- 語尾に「〜よ〜」「〜な〜」は禁止
- コメント挟まず、自然でフレンドリーなトーン
- しんみり禁止、明るくテンポよく
- コミカル寄り、柔らかい口調
- 長文すぎず、空白も多用しないで
- です・ます調で話すのは禁止
- 「あら」は禁止
- 一人称は「わたし」
";

/// Default number of round trips visible to the model
pub const DEFAULT_HISTORY_TURNS: usize = 10;

/// Who said a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    const fn prompt_label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// Which backend produced a reply, for the chat log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Cloud,
    Local,
}

impl ReplySource {
    const fn log_label(self) -> &'static str {
        match self {
            Self::Cloud => "Gemini",
            Self::Local => "Local",
        }
    }
}

/// One history entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    fn prompt_line(&self) -> String {
        format!("{}: {}", self.speaker.prompt_label(), self.text)
    }
}

/// Append-only history with a windowed read side
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    system_instruction: String,
    turns: Vec<Turn>,
    window_turns: usize,
}

impl ConversationHistory {
    #[must_use]
    pub fn new(system_instruction: impl Into<String>, window_turns: usize) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            turns: Vec::new(),
            window_turns,
        }
    }

    #[must_use]
    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// Total number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Record one user line and its reply
    pub fn push_exchange(&mut self, user_text: &str, reply: &str) {
        self.turns.push(Turn {
            speaker: Speaker::User,
            text: user_text.to_string(),
        });
        self.turns.push(Turn {
            speaker: Speaker::Assistant,
            text: reply.to_string(),
        });
    }

    /// The most recent `2 * window_turns` entries
    #[must_use]
    pub fn window(&self) -> &[Turn] {
        let keep = self.window_turns.saturating_mul(2);
        &self.turns[self.turns.len().saturating_sub(keep)..]
    }

    /// Content parts for a cloud request: instruction, window, new user line
    #[must_use]
    pub fn cloud_contents(&self, user_text: &str) -> Vec<String> {
        std::iter::once(self.system_instruction.clone())
            .chain(self.window().iter().map(Turn::prompt_line))
            .chain(std::iter::once(format!("User: {user_text}")))
            .collect()
    }

    /// Single prompt string for the local model
    #[must_use]
    pub fn local_prompt(&self, user_text: &str, extra_rules: &str) -> String {
        let convo: Vec<String> = self
            .window()
            .iter()
            .map(Turn::prompt_line)
            .chain([format!("User: {user_text}"), "Assistant:".to_string()])
            .collect();
        format!("{}{extra_rules}\n{}", self.system_instruction, convo.join("\n"))
    }
}

/// Human-readable transcript appended after every exchange
#[derive(Debug, Clone)]
pub struct ChatLog {
    path: PathBuf,
}

impl ChatLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one exchange; failures are logged and ignored
    pub async fn append(&self, user_text: &str, reply: &str, source: ReplySource) {
        let entry = format!("あなた: {user_text}\n{}: {reply}\n\n", source.log_label());
        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(entry.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to append chat log");
        }
    }
}

/// The single shared conversation
#[derive(Debug)]
pub struct Conversation {
    history: Mutex<ConversationHistory>,
    chat_log: Option<ChatLog>,
}

impl Conversation {
    #[must_use]
    pub fn new(history: ConversationHistory, chat_log: Option<ChatLog>) -> Self {
        Self {
            history: Mutex::new(history),
            chat_log,
        }
    }

    /// Prompt parts for the cloud model
    pub async fn cloud_contents(&self, user_text: &str) -> Vec<String> {
        self.history.lock().await.cloud_contents(user_text)
    }

    /// Prompt string for the local model
    pub async fn local_prompt(&self, user_text: &str, extra_rules: &str) -> String {
        self.history.lock().await.local_prompt(user_text, extra_rules)
    }

    /// Append an exchange to history and the chat log
    pub async fn record(&self, user_text: &str, reply: &str, source: ReplySource) {
        self.history.lock().await.push_exchange(user_text, reply);
        if let Some(log) = &self.chat_log {
            log.append(user_text, reply, source).await;
        }
    }

    /// Copy of the current history
    pub async fn snapshot(&self) -> ConversationHistory {
        self.history.lock().await.clone()
    }
}

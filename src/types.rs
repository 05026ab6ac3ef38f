//! Shared types used across the gateway.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Purposes
// ---------------------------------------------------------------------------

/// Logical feature category used to select isolated credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Shared fallback credential.
    General,
    MotivationalMessage,
    UrlSafety,
    PushNotification,
    UsernameValidation,
    SubtasksGeneration,
    BrainDumpConversion,
}

impl Purpose {
    /// Every purpose, in configuration order.
    pub const ALL: [Purpose; 7] = [
        Purpose::General,
        Purpose::MotivationalMessage,
        Purpose::UrlSafety,
        Purpose::PushNotification,
        Purpose::UsernameValidation,
        Purpose::SubtasksGeneration,
        Purpose::BrainDumpConversion,
    ];

    /// Key used for this purpose in the config file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::MotivationalMessage => "motivational_message",
            Self::UrlSafety => "url_safety",
            Self::PushNotification => "push_notification",
            Self::UsernameValidation => "username_validation",
            Self::SubtasksGeneration => "subtasks_generation",
            Self::BrainDumpConversion => "brain_dump_conversion",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Chat messages
// ---------------------------------------------------------------------------

/// A chat message sent to the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Completion requests and results
// ---------------------------------------------------------------------------

/// Per-call sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Ask the service for a JSON object response.
    #[serde(default)]
    pub json_response: bool,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: 1024,
            json_response: false,
        }
    }
}

/// The full request handed to a backend: sealed messages plus parameters.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub params: CompletionParams,
}

/// Token usage reported by the completion service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Result of a single-shot completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: TokenUsage,
}

/// One incremental unit of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionChunk {
    Content(String),
    Finish { reason: String },
}

// ---------------------------------------------------------------------------
// Streaming transport
// ---------------------------------------------------------------------------

/// A frame written to the caller's streaming transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Data(String),
    /// End-of-stream sentinel. Nothing follows it.
    Done,
}

impl StreamFrame {
    /// Render as a server-sent-events frame.
    pub fn to_sse(&self) -> String {
        match self {
            Self::Data(text) => format!("data: {}\n\n", text),
            Self::Done => "data: [DONE]\n\n".to_string(),
        }
    }
}

/// Terminal state of a streaming completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Finished,
    Error,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Finished => write!(f, "finished"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// What happened on a streaming call that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub state: StreamState,
    /// Content frames written to the transport (the end sentinel is not counted).
    pub frames_forwarded: usize,
    /// The caller closed the transport or cancelled before the finish marker.
    pub cancelled: bool,
}

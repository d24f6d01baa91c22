pub mod mock;
pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One single-shot completion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system: String,
    pub user: String,
}

/// Lifecycle status of a run, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
    RequiresAction,
    Incomplete,
}

impl RunStatus {
    /// No further transition happens from a terminal status.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Expired => "expired",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Incomplete => "incomplete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

/// A run of an assistant on a thread.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub status: RunStatus,
    pub created_at: i64,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextContent {
    pub value: String,
}

/// A content part of a thread message. Only text parts are read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: Role,
    pub created_at: i64,
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

impl ThreadMessage {
    /// Text of the first content part, if it is text.
    pub fn primary_text(&self) -> Option<&str> {
        match self.content.first()? {
            ContentPart::Text { text } => Some(text.value.as_str()),
            ContentPart::Other => None,
        }
    }
}

/// Ephemeral credentials for a realtime voice session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeSession {
    pub status: String,
    pub ephemeral_key: String,
    pub expires_at: i64,
    pub session_id: String,
    pub model: String,
}

/// The generative backend. One handle is shared read-only by all calls.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Single-shot completion. `None` when the reply carries no text.
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>>;

    async fn create_thread(&self) -> Result<String>;

    async fn add_message(&self, thread_id: &str, content: &str) -> Result<()>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>>;

    async fn create_realtime_session(&self, voice: &str) -> Result<RealtimeSession>;
}

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{
    Backend, CompletionRequest, ContentPart, RealtimeSession, Role, Run, RunError, RunStatus,
    TextContent, ThreadMessage,
};

pub const THREAD_ID: &str = "thread_mock";
pub const RUN_ID: &str = "run_mock";

/// One observed backend call, in the order it was made.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Complete(CompletionRequest),
    CreateThread,
    AddMessage { thread_id: String, content: String },
    CreateRun { thread_id: String, assistant_id: String },
    RetrieveRun { thread_id: String, run_id: String },
    ListMessages { thread_id: String },
    CreateRealtimeSession { voice: String },
}

impl Call {
    fn name(&self) -> &'static str {
        match self {
            Call::Complete(_) => "complete",
            Call::CreateThread => "create_thread",
            Call::AddMessage { .. } => "add_message",
            Call::CreateRun { .. } => "create_run",
            Call::RetrieveRun { .. } => "retrieve_run",
            Call::ListMessages { .. } => "list_messages",
            Call::CreateRealtimeSession { .. } => "create_realtime_session",
        }
    }
}

/// A scripted backend for tests. Completions are returned in order; run
/// statuses are returned in order and the last one repeats once exhausted.
#[derive(Default)]
pub struct MockBackend {
    completions: Vec<Option<String>>,
    completion_index: AtomicUsize,
    statuses: Vec<RunStatus>,
    status_index: AtomicUsize,
    last_error: Option<String>,
    messages: Vec<ThreadMessage>,
    fail_on: Option<&'static str>,
    stall_on: Option<&'static str>,
    calls: Mutex<Vec<Call>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a single-shot completion reply (`None` = reply without text).
    pub fn with_completion(mut self, text: Option<&str>) -> Self {
        self.completions.push(text.map(str::to_string));
        self
    }

    /// Script the statuses returned by successive `retrieve_run` calls.
    pub fn with_statuses(mut self, statuses: Vec<RunStatus>) -> Self {
        self.statuses = statuses;
        self
    }

    /// Diagnostic attached to the run once it is `failed`.
    pub fn with_last_error(mut self, message: &str) -> Self {
        self.last_error = Some(message.to_string());
        self
    }

    /// Append a message to the thread listing.
    pub fn with_message(mut self, role: Role, created_at: i64, text: &str) -> Self {
        let id = format!("msg_{}", self.messages.len() + 1);
        self.messages.push(ThreadMessage {
            id,
            role,
            created_at,
            content: vec![ContentPart::Text {
                text: TextContent {
                    value: text.to_string(),
                },
            }],
        });
        self
    }

    /// Completed-job shorthand: the caller's message plus one assistant reply.
    pub fn with_reply(self, text: &str) -> Self {
        self.with_message(Role::User, 1, "question")
            .with_message(Role::Assistant, 2, text)
    }

    /// Make the named call fail as a transport error, e.g. `"create_run"`.
    pub fn failing_on(mut self, call: &'static str) -> Self {
        self.fail_on = Some(call);
        self
    }

    /// Make the named call hang forever once recorded.
    pub fn stalling_on(mut self, call: &'static str) -> Self {
        self.stall_on = Some(call);
        self
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.name() == name).count()
    }

    async fn record(&self, call: Call) -> Result<()> {
        let name = call.name();
        self.calls.lock().unwrap().push(call);
        if self.stall_on == Some(name) {
            std::future::pending::<()>().await;
        }
        if self.fail_on == Some(name) {
            bail!("MockBackend: connection refused during {name}");
        }
        Ok(())
    }

    fn run(&self, status: RunStatus) -> Run {
        let last_error = match (status, &self.last_error) {
            (RunStatus::Failed, Some(message)) => Some(RunError {
                code: Some("server_error".to_string()),
                message: message.clone(),
            }),
            _ => None,
        };
        Run {
            id: RUN_ID.to_string(),
            thread_id: THREAD_ID.to_string(),
            status,
            created_at: 0,
            last_error,
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>> {
        self.record(Call::Complete(request.clone())).await?;
        let i = self.completion_index.fetch_add(1, Ordering::SeqCst);
        match self.completions.get(i) {
            Some(reply) => Ok(reply.clone()),
            None => bail!("MockBackend: no more completions (called {} times)", i + 1),
        }
    }

    async fn create_thread(&self) -> Result<String> {
        self.record(Call::CreateThread).await?;
        Ok(THREAD_ID.to_string())
    }

    async fn add_message(&self, thread_id: &str, content: &str) -> Result<()> {
        self.record(Call::AddMessage {
            thread_id: thread_id.to_string(),
            content: content.to_string(),
        })
        .await
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        self.record(Call::CreateRun {
            thread_id: thread_id.to_string(),
            assistant_id: assistant_id.to_string(),
        })
        .await?;
        Ok(self.run(RunStatus::Queued))
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.record(Call::RetrieveRun {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
        })
        .await?;
        let i = self.status_index.fetch_add(1, Ordering::SeqCst);
        let status = self
            .statuses
            .get(i)
            .or(self.statuses.last())
            .copied()
            .unwrap_or(RunStatus::Completed);
        Ok(self.run(status))
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        self.record(Call::ListMessages {
            thread_id: thread_id.to_string(),
        })
        .await?;
        Ok(self.messages.clone())
    }

    async fn create_realtime_session(&self, voice: &str) -> Result<RealtimeSession> {
        self.record(Call::CreateRealtimeSession {
            voice: voice.to_string(),
        })
        .await?;
        Ok(RealtimeSession {
            status: "success".to_string(),
            ephemeral_key: "ek_mock".to_string(),
            expires_at: 0,
            session_id: "sess_mock".to_string(),
            model: "mock-realtime".to_string(),
        })
    }
}

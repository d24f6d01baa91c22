use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, Role, RunStatus, ThreadMessage};
use crate::consts::{DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_MS};
use crate::error::{ClassifiedError, ErrorKind, classify};
use crate::events::{Event, EventBus};

pub struct JobConfig {
    /// Wait between two status checks.
    pub poll_interval: Duration,
    /// Give up once the whole job, backend calls included, has taken this long.
    pub timeout: Duration,
    /// Optional cap on the number of status checks.
    pub max_polls: Option<u32>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            max_polls: None,
        }
    }
}

/// A run in flight. Only the runner mutates it, and only from status checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncJob {
    pub id: String,
    pub thread_id: String,
    pub status: RunStatus,
    pub last_error: Option<String>,
}

/// Drives thread-create, message-add, run-create, poll and fetch against a
/// fixed assistant.
pub struct JobRunner {
    backend: Arc<dyn Backend>,
    assistant_id: String,
    config: JobConfig,
    events: Option<EventBus>,
}

impl JobRunner {
    pub fn new(backend: Arc<dyn Backend>, assistant_id: impl Into<String>, config: JobConfig) -> Self {
        Self {
            backend,
            assistant_id: assistant_id.into(),
            config,
            events: None,
        }
    }

    /// Publish progress events to `bus` while jobs run.
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Run `input` through the assistant and return its raw reply text.
    ///
    /// Blocks the calling task until the run is terminal, the deadline
    /// passes, or `cancel` fires.
    pub async fn run(
        &self,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ClassifiedError> {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let job = self.start(input, deadline).await?;
        let job = self.wait(job, started, deadline, cancel).await?;
        let reply = self.finish(&job, deadline).await?;

        tracing::info!(
            thread_id = %job.thread_id,
            run_id = %job.id,
            status = job.status.as_str(),
            elapsed_ms = started.elapsed().as_millis(),
            "assistant run finished"
        );
        Ok(reply)
    }

    /// Await one backend call, failing with `Timeout` once `deadline` passes.
    async fn call<T>(
        &self,
        deadline: Instant,
        what: &'static str,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, ClassifiedError> {
        match tokio::time::timeout_at(deadline, call).await {
            Ok(result) => result.context(what).map_err(classify),
            Err(_) => {
                tracing::warn!(step = what, "assistant job deadline passed mid-call");
                Err(ClassifiedError::new(
                    ErrorKind::Timeout,
                    format!(
                        "{what}: no answer within the {} ms job deadline",
                        self.config.timeout.as_millis()
                    ),
                ))
            }
        }
    }

    async fn start(&self, input: &str, deadline: Instant) -> Result<AsyncJob, ClassifiedError> {
        let thread_id = self
            .call(deadline, "failed to create thread", self.backend.create_thread())
            .await?;

        self.call(
            deadline,
            "failed to submit message",
            self.backend.add_message(&thread_id, input),
        )
        .await?;

        let run = self
            .call(
                deadline,
                "failed to launch run",
                self.backend.create_run(&thread_id, &self.assistant_id),
            )
            .await?;

        tracing::debug!(
            thread_id = %thread_id,
            run_id = %run.id,
            assistant_id = %self.assistant_id,
            "assistant run launched"
        );
        self.emit(Event::JobStarted {
            thread_id: thread_id.clone(),
            run_id: run.id.clone(),
        });

        Ok(AsyncJob {
            id: run.id,
            thread_id,
            status: run.status,
            last_error: None,
        })
    }

    /// Poll until the run is terminal. Every check is followed by one
    /// interval of sleep unless the status it returned was terminal.
    async fn wait(
        &self,
        mut job: AsyncJob,
        started: Instant,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<AsyncJob, ClassifiedError> {
        let mut polls: u32 = 0;

        loop {
            let run = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(&job)),
                run = self.call(
                    deadline,
                    "failed to check run status",
                    self.backend.retrieve_run(&job.thread_id, &job.id),
                ) => run?,
            };
            polls += 1;
            job.status = run.status;
            job.last_error = run.last_error.map(|e| e.message);

            tracing::debug!(run_id = %job.id, status = job.status.as_str(), polls, "run status");
            self.emit(Event::JobStatus {
                run_id: job.id.clone(),
                status: job.status,
                polls,
            });

            if job.status.is_terminal() {
                self.emit(Event::JobFinished {
                    run_id: job.id.clone(),
                    status: job.status,
                });
                return Ok(job);
            }

            let out_of_polls = self.config.max_polls.is_some_and(|max| polls >= max);
            let out_of_time = Instant::now() + self.config.poll_interval > deadline;
            if out_of_polls || out_of_time {
                tracing::warn!(
                    run_id = %job.id,
                    status = job.status.as_str(),
                    polls,
                    elapsed_ms = started.elapsed().as_millis(),
                    "assistant run timed out"
                );
                return Err(ClassifiedError::new(
                    ErrorKind::Timeout,
                    format!(
                        "run {} still {} after {} status checks ({} ms)",
                        job.id,
                        job.status.as_str(),
                        polls,
                        started.elapsed().as_millis()
                    ),
                ));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(&job)),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    async fn finish(&self, job: &AsyncJob, deadline: Instant) -> Result<String, ClassifiedError> {
        match job.status {
            RunStatus::Completed | RunStatus::Incomplete => self.fetch_reply(job, deadline).await,
            RunStatus::Failed => Err(ClassifiedError::job_failed(format!(
                "Assistant run failed: {}",
                job.last_error.as_deref().unwrap_or("Unknown error")
            ))),
            RunStatus::Cancelled => Err(ClassifiedError::new(
                ErrorKind::JobCancelled,
                "Assistant run was cancelled",
            )),
            RunStatus::Expired => Err(ClassifiedError::job_failed("Assistant run expired")),
            RunStatus::RequiresAction => Err(ClassifiedError::job_failed(
                "Assistant run requires tool outputs, which are not supported",
            )),
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling => {
                Err(ClassifiedError::job_failed(format!(
                    "Assistant run left in non-terminal status {}",
                    job.status.as_str()
                )))
            }
        }
    }

    async fn fetch_reply(&self, job: &AsyncJob, deadline: Instant) -> Result<String, ClassifiedError> {
        let messages = self
            .call(
                deadline,
                "failed to list messages",
                self.backend.list_messages(&job.thread_id),
            )
            .await?;

        latest_assistant_text(&messages)
            .map(str::to_string)
            .ok_or_else(|| ClassifiedError::output_missing("No response received from assistant"))
    }

    fn emit(&self, event: Event) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }
}

fn cancelled(job: &AsyncJob) -> ClassifiedError {
    tracing::info!(run_id = %job.id, "assistant run abandoned by caller");
    ClassifiedError::new(
        ErrorKind::Cancelled,
        format!("request cancelled while waiting for run {}", job.id),
    )
}

/// Primary text of the newest assistant-authored message. On equal
/// timestamps the one listed first wins.
fn latest_assistant_text(messages: &[ThreadMessage]) -> Option<&str> {
    messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .reduce(|best, m| if m.created_at > best.created_at { m } else { best })?
        .primary_text()
        .filter(|text| !text.trim().is_empty())
}

use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::Engine;
use super::job::JobRunner;
use crate::backend::{Backend, CompletionRequest};
use crate::consts::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use crate::error::{ClassifiedError, ErrorKind, classify};
use crate::model::{GenerationRequest, StructuredResult};
use crate::normalize::{ReplySource, normalize};
use crate::prompts::sales::{self, Prompt};

/// Model parameters for single-shot completions.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// What one request turns into before it reaches the backend. Direct
/// answers run as assistant jobs; every other mode is one completion.
#[derive(Debug, Clone, PartialEq)]
enum Plan {
    Job { input: String },
    SingleShot(Prompt),
}

fn plan(request: &GenerationRequest) -> Plan {
    match request {
        GenerationRequest::DirectAnswer { query } => Plan::Job {
            input: query.clone(),
        },
        GenerationRequest::ConversationAnalysis { transcript } => {
            Plan::SingleShot(sales::conversation_analysis(transcript))
        }
        GenerationRequest::StructuredExtraction { transcript, prior } => {
            Plan::SingleShot(sales::structured_extraction(transcript, prior))
        }
        GenerationRequest::ActionItemExtraction { transcript } => {
            Plan::SingleShot(sales::action_items(transcript))
        }
    }
}

/// Mode-selection entry point. Stateless between calls; the backend
/// handle is shared read-only.
pub struct GenerationDispatcher {
    backend: Arc<dyn Backend>,
    completion: CompletionConfig,
    jobs: Option<JobRunner>,
}

impl GenerationDispatcher {
    pub fn new(backend: Arc<dyn Backend>, completion: CompletionConfig) -> Self {
        Self {
            backend,
            completion,
            jobs: None,
        }
    }

    /// Enable job-backed modes. Without a runner they fail as unavailable.
    pub fn with_jobs(mut self, jobs: JobRunner) -> Self {
        self.jobs = Some(jobs);
        self
    }

    async fn via_job(
        &self,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ClassifiedError> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| ClassifiedError::backend_unavailable("no assistant configured"))?;
        jobs.run(input, cancel).await
    }

    async fn via_completion(
        &self,
        prompt: Prompt,
        cancel: &CancellationToken,
    ) -> Result<String, ClassifiedError> {
        let request = CompletionRequest {
            model: self.completion.model.clone(),
            temperature: self.completion.temperature,
            max_tokens: self.completion.max_tokens,
            system: prompt.system,
            user: prompt.user,
        };

        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ClassifiedError::new(
                    ErrorKind::Cancelled,
                    "request cancelled while waiting for completion",
                ));
            }
            reply = self.backend.complete(&request) => reply
                .context("completion call failed")
                .map_err(classify)?,
        };

        reply.ok_or_else(|| {
            ClassifiedError::output_missing("No response content received from backend")
        })
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<StructuredResult, ClassifiedError> {
        let (raw, source) = match plan(request) {
            Plan::Job { input } => (self.via_job(&input, cancel).await?, ReplySource::Job),
            Plan::SingleShot(prompt) => (
                self.via_completion(prompt, cancel).await?,
                ReplySource::SingleShot,
            ),
        };
        if raw.trim().is_empty() {
            return Err(ClassifiedError::output_missing("backend reply is empty"));
        }
        normalize(request.mode().result_kind(), &raw, source)
    }
}

#[async_trait]
impl Engine for GenerationDispatcher {
    async fn execute(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<StructuredResult, ClassifiedError> {
        let mode = request.mode();
        let started = Instant::now();
        tracing::info!(mode = mode.as_str(), "generation started");

        let outcome = self.generate(request, cancel).await;

        match &outcome {
            Ok(result) => {
                tracing::info!(
                    mode = mode.as_str(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "generation completed"
                );
                tracing::debug!(mode = mode.as_str(), ?result, "normalized result");
            }
            Err(e) => tracing::error!(
                mode = mode.as_str(),
                kind = e.kind.as_str(),
                elapsed_ms = started.elapsed().as_millis(),
                error = %e.message,
                "generation failed"
            ),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DiscoState, Mode};

    fn all_requests() -> Vec<GenerationRequest> {
        vec![
            GenerationRequest::DirectAnswer {
                query: "how do I handle a pricing objection?".to_string(),
            },
            GenerationRequest::ConversationAnalysis {
                transcript: "t".to_string(),
            },
            GenerationRequest::StructuredExtraction {
                transcript: "t".to_string(),
                prior: DiscoState::default(),
            },
            GenerationRequest::ActionItemExtraction {
                transcript: "t".to_string(),
            },
        ]
    }

    #[test]
    fn only_direct_answer_plans_a_job() {
        for request in all_requests() {
            let is_job = matches!(plan(&request), Plan::Job { .. });
            assert_eq!(is_job, request.mode() == Mode::DirectAnswer, "{:?}", request.mode());
        }
    }

    #[test]
    fn direct_answer_submits_raw_query() {
        let request = GenerationRequest::DirectAnswer {
            query: "what next?".to_string(),
        };
        assert_eq!(
            plan(&request),
            Plan::Job {
                input: "what next?".to_string()
            }
        );
        assert_eq!(request.mode(), Mode::DirectAnswer);
    }

    #[test]
    fn default_completion_config() {
        let config = CompletionConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }
}

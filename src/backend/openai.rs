use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Backend, CompletionRequest, RealtimeSession, Run, ThreadMessage};
use crate::consts::HTTP_TIMEOUT_SECS;

const ASSISTANTS_BETA: &str = "assistants=v2";

/// Backend speaking the OpenAI chat-completions, assistants and realtime APIs.
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    realtime_model: String,
}

impl OpenAiBackend {
    pub fn new(base_url: &str, api_key: &str, realtime_model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("callpilot/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            realtime_model: realtime_model.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
    }

    fn assistants(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, path)
            .header("OpenAI-Beta", ASSISTANTS_BETA)
    }

    async fn send<T: DeserializeOwned>(req: RequestBuilder, what: &str) -> Result<T> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("{what}: request failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("{what}: OpenAI API error ({status}): {text}");
        }

        resp.json::<T>()
            .await
            .with_context(|| format!("{what}: unexpected response body"))
    }

    fn chat_body(request: &CompletionRequest) -> ChatRequest<'_> {
        ChatRequest {
            model: &request.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
        }
    }

    fn first_choice_text(resp: ChatResponse) -> Option<String> {
        resp.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.is_empty())
    }

    fn session_from(resp: SessionResponse) -> RealtimeSession {
        RealtimeSession {
            status: "success".to_string(),
            ephemeral_key: resp.client_secret.value,
            expires_at: resp.client_secret.expires_at,
            session_id: resp.id,
            model: resp.model,
        }
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>> {
        let req = self
            .request(Method::POST, "/chat/completions")
            .json(&Self::chat_body(request));
        let resp: ChatResponse = Self::send(req, "chat completion").await?;
        Ok(Self::first_choice_text(resp))
    }

    async fn create_thread(&self) -> Result<String> {
        let req = self
            .assistants(Method::POST, "/threads")
            .json(&serde_json::json!({}));
        let thread: Created = Self::send(req, "create thread").await?;
        Ok(thread.id)
    }

    async fn add_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let req = self
            .assistants(Method::POST, &format!("/threads/{thread_id}/messages"))
            .json(&NewMessage {
                role: "user",
                content,
            });
        let _: Created = Self::send(req, "add message").await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let req = self
            .assistants(Method::POST, &format!("/threads/{thread_id}/runs"))
            .json(&NewRun { assistant_id });
        Self::send(req, "create run").await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let req = self.assistants(Method::GET, &format!("/threads/{thread_id}/runs/{run_id}"));
        Self::send(req, "retrieve run").await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let req = self.assistants(
            Method::GET,
            &format!("/threads/{thread_id}/messages?order=desc"),
        );
        let page: MessagePage = Self::send(req, "list messages").await?;
        Ok(page.data)
    }

    async fn create_realtime_session(&self, voice: &str) -> Result<RealtimeSession> {
        let req = self
            .request(Method::POST, "/realtime/sessions")
            .json(&NewSession {
                model: &self.realtime_model,
                voice,
            });
        let resp: SessionResponse = Self::send(req, "create realtime session").await?;
        Ok(Self::session_from(resp))
    }
}

// --- API types ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Serialize)]
struct NewMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct NewRun<'a> {
    assistant_id: &'a str,
}

#[derive(Deserialize)]
struct MessagePage {
    data: Vec<ThreadMessage>,
}

#[derive(Serialize)]
struct NewSession<'a> {
    model: &'a str,
    voice: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    model: String,
    client_secret: ClientSecret,
}

#[derive(Deserialize)]
struct ClientSecret {
    value: String,
    expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_tokens: 2000,
            system: "be terse".to_string(),
            user: "transcript".to_string(),
        }
    }

    #[test]
    fn chat_body_has_system_then_user() {
        let req = request();
        let body = serde_json::to_value(OpenAiBackend::chat_body(&req)).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 2000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be terse");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "transcript");
    }

    #[test]
    fn first_choice_text_reads_content() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"analysis\": \"- a\"}"}}]}"#,
        )
        .unwrap();
        assert_eq!(
            OpenAiBackend::first_choice_text(resp).unwrap(),
            r#"{"analysis": "- a"}"#
        );
    }

    #[test]
    fn first_choice_text_none_when_empty_or_null() {
        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(OpenAiBackend::first_choice_text(empty).is_none());

        let null: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert!(OpenAiBackend::first_choice_text(null).is_none());

        let blank: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": ""}}]}"#).unwrap();
        assert!(OpenAiBackend::first_choice_text(blank).is_none());
    }

    #[test]
    fn message_page_decodes() {
        let page: MessagePage = serde_json::from_str(
            r#"{"object": "list", "data": [
                {"id": "m2", "role": "assistant", "created_at": 2,
                 "content": [{"type": "text", "text": {"value": "hi", "annotations": []}}]},
                {"id": "m1", "role": "user", "created_at": 1,
                 "content": [{"type": "text", "text": {"value": "q", "annotations": []}}]}
            ], "has_more": false}"#,
        )
        .unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0].primary_text(), Some("hi"));
    }

    #[test]
    fn session_maps_client_secret() {
        let resp: SessionResponse = serde_json::from_str(
            r#"{"id": "sess_1", "object": "realtime.session", "model": "gpt-4o-mini-realtime",
                "voice": "alloy", "client_secret": {"value": "ek_123", "expires_at": 1700000060}}"#,
        )
        .unwrap();
        let session = OpenAiBackend::session_from(resp);
        assert_eq!(session.status, "success");
        assert_eq!(session.ephemeral_key, "ek_123");
        assert_eq!(session.expires_at, 1700000060);
        assert_eq!(session.session_id, "sess_1");

        let out = serde_json::to_value(&session).unwrap();
        assert_eq!(out["ephemeralKey"], "ek_123");
        assert_eq!(out["sessionId"], "sess_1");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let backend = OpenAiBackend::new("http://localhost:8080/v1/", "sk-test", "rt").unwrap();
        assert_eq!(backend.base_url, "http://localhost:8080/v1");
    }
}

//! OpenAI-compatible `/chat/completions` client.
//!
//! Serves as the evaluator of a run, and can also act as a plain chat agent
//! with no tools (each task gets its own [`ChatAgent`] sharing one client).

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    EvaluationContext, EvaluatorConfig, TaskDescriptor, TraceEntry, UsageReport, Verdict,
};
use crate::domain::ports::{Agent, AgentFactory, Evaluator};
use crate::services::prompts::render_evaluation_prompt;

/// Connection settings for a chat completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    /// Base URL; `/chat/completions` is appended.
    pub base_url: String,
    pub model: String,
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_tokens: Option<u32>,
}

impl From<&EvaluatorConfig> for ChatCompletionsConfig {
    fn from(config: &EvaluatorConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: config.resolve_api_key(),
            timeout_secs: config.request_timeout_secs,
            max_tokens: config.max_tokens,
        }
    }
}

/// Failures of a single `/chat/completions` round trip.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("failed to parse response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("response contained no choices")]
    NoChoices,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageReport>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Shared HTTP client for one chat completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    config: ChatCompletionsConfig,
    client: Client,
}

impl ChatCompletionsClient {
    pub fn new(config: ChatCompletionsConfig) -> DomainResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                DomainError::SessionUnavailable(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Send `prompt` as a single user message.
    async fn complete(&self, prompt: &str) -> Result<(String, Option<UsageReport>), ChatError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let mut builder = self
            .client
            .post(self.endpoint())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Api { status, body });
        }

        let parsed: ChatResponse = response.json().await.map_err(ChatError::Decode)?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ChatError::NoChoices)?;

        debug!(
            model = %self.config.model,
            chars = content.len(),
            total_tokens = parsed.usage.and_then(|u| u.total_tokens),
            "chat completion received"
        );
        Ok((content, parsed.usage.filter(|usage| !usage.is_empty())))
    }
}

#[async_trait]
impl Evaluator for ChatCompletionsClient {
    async fn evaluate(&self, context: &EvaluationContext) -> DomainResult<Verdict> {
        let prompt = render_evaluation_prompt(context);
        let (text, usage) = self
            .complete(&prompt)
            .await
            .map_err(|e| DomainError::EvaluatorCallFailed(e.to_string()))?;

        let verdict = Verdict::new(text);
        Ok(match usage {
            Some(usage) => verdict.with_usage(usage),
            None => verdict,
        })
    }
}

#[async_trait]
impl AgentFactory for ChatCompletionsClient {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn create(
        &self,
        _task_index: usize,
        _descriptor: &TaskDescriptor,
    ) -> DomainResult<Box<dyn Agent>> {
        Ok(Box::new(ChatAgent {
            client: self.clone(),
            trace: Vec::new(),
        }))
    }
}

/// Tool-less chat agent backed by a [`ChatCompletionsClient`].
#[derive(Debug)]
pub struct ChatAgent {
    client: ChatCompletionsClient,
    trace: Vec<TraceEntry>,
}

#[async_trait]
impl Agent for ChatAgent {
    async fn run(&mut self, prompt: &str) -> DomainResult<String> {
        self.trace.clear();
        match self.client.complete(prompt).await {
            Ok((text, usage)) => {
                self.trace.push(TraceEntry::Content {
                    text: text.clone(),
                    usage,
                });
                Ok(text)
            }
            Err(err) => {
                let message = err.to_string();
                self.trace.push(TraceEntry::Error {
                    message: message.clone(),
                });
                Err(DomainError::AgentCallFailed(message))
            }
        }
    }

    fn trace(&self) -> Vec<TraceEntry> {
        self.trace.clone()
    }

    async fn shutdown(&mut self) {
        self.trace.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{first_usage, ConversationTurn, TASK_COMPLETE_MARKER};
    use mockito::{Matcher, Server};

    fn client(base_url: String, api_key: Option<&str>) -> ChatCompletionsClient {
        ChatCompletionsClient::new(ChatCompletionsConfig {
            base_url,
            model: "judge-model".to_string(),
            api_key: api_key.map(str::to_string),
            timeout_secs: 5,
            max_tokens: Some(256),
        })
        .unwrap()
    }

    fn context() -> EvaluationContext {
        EvaluationContext {
            instruction: "write a snake game".to_string(),
            trace: vec![TraceEntry::content("snake.py created")],
            history: vec![
                ConversationTurn::user("write a snake game"),
                ConversationTurn::assistant("snake.py created"),
            ],
            completion_marker: TASK_COMPLETE_MARKER.to_string(),
        }
    }

    fn completion_body(content: &str) -> String {
        serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 120, "completion_tokens": 8, "total_tokens": 128}
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_evaluate_returns_verdict_and_usage() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "judge-model",
                "max_tokens": 256,
                "stream": false
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("任务已完成"))
            .create_async()
            .await;

        let verdict = client(server.url(), Some("test-key"))
            .evaluate(&context())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(verdict.text, "任务已完成");
        assert_eq!(verdict.usage, Some(UsageReport::new(128, 120, 8)));
    }

    #[tokio::test]
    async fn test_evaluate_prompt_carries_context() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex("write a snake game".to_string()))
            .with_status(200)
            .with_body(completion_body("keep going"))
            .create_async()
            .await;

        client(server.url(), None).evaluate(&context()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_is_evaluator_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client = client(server.url(), None);
        let err = client.evaluate(&context()).await.unwrap_err();
        assert!(matches!(err, DomainError::EvaluatorCallFailed(ref msg) if msg.contains("503")));

        let raw = client.complete("anything").await.unwrap_err();
        assert!(matches!(
            raw,
            ChatError::Api { status, ref body }
                if status == StatusCode::SERVICE_UNAVAILABLE && body == "overloaded"
        ));
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let err = client(server.url(), None)
            .complete("anything")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NoChoices));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client(server.url(), None)
            .complete("anything")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Decode(_)));
        assert!(err.to_string().starts_with("failed to parse response"));
    }

    #[tokio::test]
    async fn test_chat_agent_records_trace() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion_body("here is the code"))
            .create_async()
            .await;

        let factory = client(format!("{}/", server.url()), None);
        let mut agent = factory
            .create(0, &TaskDescriptor::new(".", "x"))
            .await
            .unwrap();

        assert_eq!(agent.run("prompt").await.unwrap(), "here is the code");
        assert_eq!(first_usage(&agent.trace()), Some(UsageReport::new(128, 120, 8)));
        agent.shutdown().await;
        assert!(agent.trace().is_empty());
    }

    #[tokio::test]
    async fn test_chat_agent_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .create_async()
            .await;

        let factory = client(server.url(), Some("bad"));
        let mut agent = factory
            .create(0, &TaskDescriptor::new(".", "x"))
            .await
            .unwrap();
        let err = agent.run("prompt").await.unwrap_err();
        assert!(matches!(err, DomainError::AgentCallFailed(ref msg) if msg.contains("401")));
        assert!(matches!(agent.trace()[0], TraceEntry::Error { .. }));
    }
}

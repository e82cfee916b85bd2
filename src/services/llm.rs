use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ProviderCredential;
use crate::document::MultimodalExtractor;
use crate::utils::error::ApiError;
use crate::utils::limiters::Limiters;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Narrow seam over chat completion so the summarizer, classifier, and
/// orchestrator can be tested without a live provider.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ApiError>;
    async fn complete_json(&self, model: &str, messages: &[ChatMessage]) -> Result<Value, ApiError>;
}

#[async_trait]
impl Completer for LlmClient {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ApiError> {
        LlmClient::complete(self, model, messages).await
    }

    async fn complete_json(&self, model: &str, messages: &[ChatMessage]) -> Result<Value, ApiError> {
        LlmClient::complete_json(self, model, messages).await
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// HTTP client for the configured LLM provider, used by the
/// orchestrator (completions), the summarizer, and the tool-use
/// classifier. Also implements `MultimodalExtractor` for the parser
/// registry's PDF/rich-text/image/audio/video families.
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    limiters: Arc<Limiters>,
}

impl LlmClient {
    pub fn new(credential: &ProviderCredential, timeout: Duration, limiters: Arc<Limiters>) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: credential
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            api_key: credential.api_key.clone(),
            limiters,
        }
    }

    /// Plain-text, non-streaming completion (responses to clients are
    /// never streamed, per the Non-goals).
    pub async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ApiError> {
        let (_permit, wait) =
            Limiters::acquire_timed(self.limiters.llm.clone(), self.limiters.acquire_timeout, "llm")
                .await
                .map_err(|e| ApiError::Internal(format!("llm limiter: {e}")))?;
        debug!(wait_ms = wait.as_millis() as u64, op = "llm", "wait_queue");

        let exec_start = Instant::now();
        let body = self
            .post_chat(&json!({
                "model": model,
                "messages": messages,
                "stream": false,
            }))
            .await?;
        debug!(exec_ms = exec_start.elapsed().as_millis() as u64, op = "llm", "exec");

        let parsed: ChatCompletionResponse = serde_json::from_value(body)
            .map_err(|e| ApiError::Internal(format!("failed to parse LLM response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ApiError::Internal("LLM response had no message content".to_string()))
    }

    /// Schema-constrained completion: asks the provider for a JSON
    /// object matching `schema_hint` and parses the raw response body
    /// as JSON. Used by the tool-use classifier.
    pub async fn complete_json(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<Value, ApiError> {
        let (_permit, wait) =
            Limiters::acquire_timed(self.limiters.llm.clone(), self.limiters.acquire_timeout, "llm")
                .await
                .map_err(|e| ApiError::Internal(format!("llm limiter: {e}")))?;
        debug!(wait_ms = wait.as_millis() as u64, op = "llm_json", "wait_queue");

        let body = self
            .post_chat(&json!({
                "model": model,
                "messages": messages,
                "stream": false,
                "response_format": {"type": "json_object"},
            }))
            .await?;

        let parsed: ChatCompletionResponse = serde_json::from_value(body)
            .map_err(|e| ApiError::Internal(format!("failed to parse LLM response: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ApiError::Internal("LLM response had no message content".to_string()))?;

        serde_json::from_str(&content)
            .map_err(|e| ApiError::Internal(format!("classifier returned non-JSON content: {e}")))
    }

    async fn post_chat(&self, payload: &Value) -> Result<Value, ApiError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(payload);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ApiError::UpstreamTransient(format!("LLM provider unreachable: {e}"))
            } else {
                ApiError::Internal(format!("LLM request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ApiError::UpstreamAuth("LLM provider rejected credentials".to_string()));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::UpstreamRate("LLM provider rate limited the request".to_string()));
        }
        if status.is_server_error() {
            return Err(ApiError::UpstreamTransient(format!("LLM provider error {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!("LLM provider returned {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Internal(format!("failed to parse LLM response body: {e}")))
    }
}

#[async_trait]
impl MultimodalExtractor for LlmClient {
    async fn extract(&self, bytes: &[u8], mime: &str, instruction: &str) -> Result<String, ApiError> {
        let (_permit, wait) =
            Limiters::acquire_timed(self.limiters.llm.clone(), self.limiters.acquire_timeout, "multimodal")
                .await
                .map_err(|e| ApiError::Internal(format!("llm limiter: {e}")))?;
        debug!(wait_ms = wait.as_millis() as u64, op = "multimodal", "wait_queue");

        // Inline the real base64 payload into the data URL rather than
        // the literal string "data_url".
        let data_url = format!("data:{mime};base64,{}", STANDARD.encode(bytes));

        let content_block = if mime.starts_with("audio/") {
            json!([
                {"type": "text", "text": instruction},
                {"type": "input_audio", "input_audio": {"data": STANDARD.encode(bytes), "format": mime}},
            ])
        } else {
            json!([
                {"type": "text", "text": instruction},
                {"type": "image_url", "image_url": {"url": data_url}},
            ])
        };

        let payload = json!({
            "model": "multimodal-extractor",
            "messages": [{"role": "user", "content": content_block}],
            "stream": false,
        });

        let body = self.post_chat(&payload).await?;
        let parsed: ChatCompletionResponse = serde_json::from_value(body)
            .map_err(|e| ApiError::Internal(format!("failed to parse extractor response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ApiError::UpstreamTransient("multimodal extractor returned no content".to_string()))
    }
}

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::services::llm::{ChatMessage, Completer};

const SYSTEM_PROMPT: &str = "You are an expert at choosing the optimal number of chunks (top_k) to \
retrieve from a vector store for a given user query. Based on the user's query, determine how \
specific or broad it is, and select the appropriate top_k value:\n\n\
- Pick 3 if very specific and focused.\n\
- Pick 5 if moderately specific.\n\
- Pick 8 if very broad or open ended.\n\n\
Respond with JSON: {\"top_k\": <3, 5, or 8>}.";

const ALLOWED_VALUES: &[usize] = &[3, 5, 8];

/// Query-specificity classifier for adaptive retrieval width: asks the
/// LLM to rate how specific the query is and returns one of `{3, 5,
/// 8}`. Falls back to `default_k` on any LLM failure or on a response
/// outside the allowed set.
pub struct TopKSelector {
    llm: Arc<dyn Completer>,
}

impl TopKSelector {
    pub fn new(llm: Arc<dyn Completer>) -> Self {
        Self { llm }
    }

    pub async fn select(&self, query_text: &str, model: &str, default_k: usize) -> usize {
        if query_text.trim().is_empty() {
            return default_k;
        }

        let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(query_text)];
        match self.llm.complete_json(model, &messages).await {
            Ok(raw) => parse_top_k(&raw).unwrap_or(default_k),
            Err(e) => {
                warn!("top-k selector failed, using default width: {e}");
                default_k
            }
        }
    }
}

fn parse_top_k(raw: &Value) -> Option<usize> {
    let value = raw.get("top_k")?.as_u64()? as usize;
    ALLOWED_VALUES.contains(&value).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use crate::utils::error::ApiError;

    struct JsonCompleter(Value);

    #[async_trait]
    impl Completer for JsonCompleter {
        async fn complete(&self, _model: &str, _messages: &[ChatMessage]) -> Result<String, ApiError> {
            unimplemented!()
        }
        async fn complete_json(&self, _model: &str, _messages: &[ChatMessage]) -> Result<Value, ApiError> {
            Ok(self.0.clone())
        }
    }

    struct FailingCompleter;

    #[async_trait]
    impl Completer for FailingCompleter {
        async fn complete(&self, _model: &str, _messages: &[ChatMessage]) -> Result<String, ApiError> {
            unimplemented!()
        }
        async fn complete_json(&self, _model: &str, _messages: &[ChatMessage]) -> Result<Value, ApiError> {
            Err(ApiError::UpstreamTransient("selector unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn empty_query_short_circuits_to_default() {
        let selector = TopKSelector::new(Arc::new(FailingCompleter));
        assert_eq!(selector.select("", "gpt-4o", 5).await, 5);
    }

    #[tokio::test]
    async fn narrow_response_is_honored() {
        let selector = TopKSelector::new(Arc::new(JsonCompleter(json!({"top_k": 3}))));
        assert_eq!(selector.select("what's the capital of France", "gpt-4o", 5).await, 3);
    }

    #[tokio::test]
    async fn wide_response_is_honored() {
        let selector = TopKSelector::new(Arc::new(JsonCompleter(json!({"top_k": 8}))));
        assert_eq!(selector.select("tell me everything about this project", "gpt-4o", 5).await, 8);
    }

    #[tokio::test]
    async fn out_of_range_response_falls_back_to_default() {
        let selector = TopKSelector::new(Arc::new(JsonCompleter(json!({"top_k": 42}))));
        assert_eq!(selector.select("query", "gpt-4o", 5).await, 5);
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_default() {
        let selector = TopKSelector::new(Arc::new(FailingCompleter));
        assert_eq!(selector.select("query", "gpt-4o", 5).await, 5);
    }
}

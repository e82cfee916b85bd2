use std::sync::Arc;

use tracing::warn;

use crate::services::llm::{ChatMessage, Completer};
use crate::services::tokenizer::TokenizerRegistry;
use crate::utils::error::ApiError;

const MAX_LIMIT: usize = 1_000_000;
const MAX_PASSES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarizeStatus {
    /// `original_size <= target_tokens`; input returned as-is.
    Unchanged,
    Success,
    /// Still over target after `MAX_PASSES` compression passes.
    Partial,
}

#[derive(Debug, Clone)]
pub struct SummarizeResult {
    pub status: SummarizeStatus,
    pub content: String,
    pub original_size: usize,
    pub reduced_size: usize,
}

/// Iteratively compresses text to a token budget via an LLM.
pub struct Summarizer {
    llm: Arc<dyn Completer>,
    tokenizer: Arc<TokenizerRegistry>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn Completer>, tokenizer: Arc<TokenizerRegistry>) -> Self {
        Self { llm, tokenizer }
    }

    pub async fn summarize(
        &self,
        text: &str,
        target_tokens: usize,
        provider: &str,
        model: &str,
    ) -> Result<SummarizeResult, ApiError> {
        if target_tokens == 0 {
            return Err(ApiError::Validation("target_tokens must be > 0".to_string()));
        }

        let original_size = self.count(text, provider, model);
        if original_size > MAX_LIMIT {
            return Err(ApiError::Validation(format!(
                "text of {original_size} tokens exceeds the summarizer's {MAX_LIMIT}-token limit"
            )));
        }
        if original_size <= target_tokens {
            return Ok(SummarizeResult {
                status: SummarizeStatus::Unchanged,
                content: text.to_string(),
                original_size,
                reduced_size: original_size,
            });
        }

        let mut current = text.to_string();
        let mut current_size = original_size;

        for pass in 1..=MAX_PASSES {
            let prompt = format!(
                "Distill the following text to at most {target_tokens} tokens. \
                 Preserve all important details.\n\n{current}"
            );
            current = match self.llm.complete(model, &[ChatMessage::user(prompt)]).await {
                Ok(distilled) => distilled,
                Err(e) => {
                    warn!("summarizer pass {pass} failed, stopping early: {e}");
                    break;
                }
            };
            current_size = self.count(&current, provider, model);
            if current_size <= target_tokens {
                return Ok(SummarizeResult {
                    status: SummarizeStatus::Success,
                    content: current,
                    original_size,
                    reduced_size: current_size,
                });
            }
        }

        Ok(SummarizeResult {
            status: SummarizeStatus::Partial,
            content: current,
            original_size,
            reduced_size: current_size,
        })
    }

    /// `provider`/`model` are expected to have already been validated at
    /// request intake, so a lookup failure here is unexpected rather than
    /// routine; it's still advisory, not fatal, to summarization.
    fn count(&self, text: &str, provider: &str, model: &str) -> usize {
        self.tokenizer.count(text, provider, model).unwrap_or_else(|e| {
            warn!("summarizer: tokenizer lookup failed for {provider}/{model}, falling back to length estimate: {e}");
            text.chars().count() / 4
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticCompleter {
        reply: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Completer for StaticCompleter {
        async fn complete(&self, _model: &str, _messages: &[ChatMessage]) -> Result<String, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }

        async fn complete_json(&self, _model: &str, _messages: &[ChatMessage]) -> Result<Value, ApiError> {
            unimplemented!()
        }
    }

    fn summarizer(reply: &str) -> (Summarizer, Arc<StaticCompleter>) {
        let completer = Arc::new(StaticCompleter { reply: reply.to_string(), calls: AtomicUsize::new(0) });
        let s = Summarizer::new(completer.clone(), Arc::new(TokenizerRegistry::new()));
        (s, completer)
    }

    #[tokio::test]
    async fn short_text_is_unchanged() {
        let (s, completer) = summarizer("irrelevant");
        let result = s.summarize("hi there", 1000, "openai", "gpt-4o").await.unwrap();
        assert_eq!(result.status, SummarizeStatus::Unchanged);
        assert_eq!(result.content, "hi there");
        assert_eq!(completer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_zero_target() {
        let (s, _) = summarizer("irrelevant");
        let err = s.summarize("some text", 0, "openai", "gpt-4o").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn converges_to_success_within_budget() {
        let short_reply = "short";
        let (s, completer) = summarizer(short_reply);
        let long_text = "word ".repeat(2000);
        let result = s.summarize(&long_text, 5, "openai", "gpt-4o").await.unwrap();
        assert_eq!(result.status, SummarizeStatus::Success);
        assert_eq!(result.content, short_reply);
        assert_eq!(completer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stays_over_budget_after_max_passes_returns_partial() {
        let long_reply = "word ".repeat(2000);
        let (s, completer) = summarizer(&long_reply);
        let result = s.summarize(&long_reply, 5, "openai", "gpt-4o").await.unwrap();
        assert_eq!(result.status, SummarizeStatus::Partial);
        assert_eq!(completer.calls.load(Ordering::SeqCst), MAX_PASSES);
    }
}

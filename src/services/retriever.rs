use std::sync::Arc;

use tracing::debug;

use crate::database::PersistenceClient;
use crate::services::embedding::EmbeddingService;
use crate::services::topk::TopKSelector;
use crate::utils::error::ApiError;

/// Vector similarity search over a thread's file chunks, rendered into
/// a prompt-ready text block.
pub struct Retriever {
    persistence: Arc<PersistenceClient>,
    embedding: Arc<EmbeddingService>,
    top_k: Arc<TopKSelector>,
    similarity_threshold: f32,
    default_k: usize,
}

impl Retriever {
    pub fn new(
        persistence: Arc<PersistenceClient>,
        embedding: Arc<EmbeddingService>,
        top_k: Arc<TopKSelector>,
        similarity_threshold: f32,
        default_k: usize,
    ) -> Self {
        Self { persistence, embedding, top_k, similarity_threshold, default_k }
    }

    pub async fn retrieve(&self, thread_id: &str, query_text: &str, model: &str) -> Result<String, ApiError> {
        if query_text.trim().is_empty() {
            return Ok(String::new());
        }

        let Some(query_embedding) = self.embedding.embed(query_text).await else {
            debug!("retriever: embedding unavailable for query, skipping retrieval");
            return Ok(String::new());
        };

        let k = self.top_k.select(query_text, model, self.default_k).await;
        let results = self
            .persistence
            .search_vectors(&query_embedding, "files", thread_id, self.similarity_threshold, k)
            .await?;

        if results.is_empty() {
            return Ok(String::new());
        }

        let rendered = results
            .iter()
            .enumerate()
            .map(|(i, scored)| {
                let file_name = scored
                    .vector
                    .metadata
                    .file_name
                    .as_deref()
                    .unwrap_or("unknown");
                format!("Chunk #{} (Source: {file_name}): {}", i + 1, scored.vector.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvidersConfig;
    use crate::services::llm::{ChatMessage, Completer};
    use crate::utils::limiters::Limiters;
    use async_trait::async_trait;
    use serde_json::{json, Value};

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

    fn retriever(top_k_response: Value) -> Retriever {
        let providers = ProvidersConfig {
            llm: Default::default(),
            llm_model: "gpt-4o".to_string(),
            embedding: Default::default(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            search_preference: "tavily".to_string(),
            tavily: Default::default(),
            linkup: Default::default(),
            firecrawl: Default::default(),
            transcript: Default::default(),
        };
        let limits = crate::config::LimitsConfig {
            embedding_fanout: 4,
            embedding_concurrency: 4,
            db_search_concurrency: 4,
            llm_concurrency: 4,
            acquire_timeout_ms: 1000,
            parse_timeout_seconds: 60,
            embedding_timeout_seconds: 30,
            summarize_timeout_seconds: 30,
            classify_timeout_seconds: 30,
            enrichment_timeout_seconds: 30,
            llm_completion_timeout_seconds: 300,
        };
        let limiters = Arc::new(Limiters::new(&limits));
        let embedding = Arc::new(EmbeddingService::new(&providers, limiters));
        let persistence = Arc::new(PersistenceClient::new(&crate::config::PersistenceConfig {
            base_url: "http://localhost:3000".to_string(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_seconds: 3600,
            request_timeout_seconds: 15,
        }));
        let top_k = Arc::new(TopKSelector::new(Arc::new(JsonCompleter(top_k_response))));
        Retriever::new(persistence, embedding, top_k, 0.5, 5)
    }

    #[tokio::test]
    async fn empty_query_short_circuits_without_retrieval() {
        let r = retriever(json!({"top_k": 3}));
        let result = r.retrieve("thread-1", "   ", "gpt-4o").await.unwrap();
        assert_eq!(result, "");
    }
}

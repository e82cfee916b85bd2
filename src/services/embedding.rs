use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ProvidersConfig;
use crate::utils::limiters::Limiters;

/// Embeds text against the configured provider. `embed` never
/// propagates an error: on any provider failure it returns `None` and
/// callers skip the chunk.
pub struct EmbeddingService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    limiters: Arc<Limiters>,
}

impl EmbeddingService {
    pub fn new(providers: &ProvidersConfig, limiters: Arc<Limiters>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: providers
                .embedding
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            api_key: providers.embedding.api_key.clone(),
            model: providers.embedding_model.clone(),
            dimension: providers.embedding_dimension,
            limiters,
        }
    }

    /// Caller must keep `text` under the model's token limit (~8K).
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        if text.trim().is_empty() {
            return None;
        }

        let (_permit, wait) = Limiters::acquire_timed(
            self.limiters.embedding.clone(),
            self.limiters.acquire_timeout,
            "embedding",
        )
        .await
        .map_err(|e| warn!("embedding limiter: {e}"))
        .ok()?;
        debug!(wait_ms = wait.as_millis() as u64, op = "embedding", "wait_queue");

        let exec_start = Instant::now();
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&json!({
            "input": text,
            "model": self.model,
        }));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("embedding request failed: {e}");
                return None;
            }
        };
        debug!(exec_ms = exec_start.elapsed().as_millis() as u64, op = "embedding", "exec");

        if !response.status().is_success() {
            warn!("embedding provider returned {}", response.status());
            return None;
        }

        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!("failed to parse embedding response: {e}");
                return None;
            }
        };

        let embedding = normalize_embedding(&body)?;
        if embedding.is_empty() {
            warn!("embedding provider returned an empty vector");
            return None;
        }

        Some(truncate_matryoshka(embedding, self.dimension))
    }
}

/// Truncates to the configured dimension when the provider returned
/// more (Matryoshka truncation): the prefix of the vector, not a
/// re-projection.
fn truncate_matryoshka(mut embedding: Vec<f32>, dimension: usize) -> Vec<f32> {
    if dimension > 0 && embedding.len() > dimension {
        embedding.truncate(dimension);
    }
    embedding
}

/// Normalizes heterogeneous provider response shapes into a plain
/// `Vec<f32>`, guarding against OpenAI-style wrapper objects
/// (`{data: [{embedding: [...]}]}`), bare arrays, and nested arrays.
fn normalize_embedding(value: &Value) -> Option<Vec<f32>> {
    match value {
        Value::Array(arr) => {
            if arr.is_empty() {
                return None;
            }
            if arr.iter().all(|v| v.is_number()) {
                arr.iter().map(|v| v.as_f64().map(|f| f as f32)).collect()
            } else {
                normalize_embedding(&arr[0])
            }
        }
        Value::Object(map) => {
            for key in ["embedding", "data", "values", "vector"] {
                if let Some(inner) = map.get(key) {
                    if let Some(v) = normalize_embedding(inner) {
                        return Some(v);
                    }
                }
            }
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_openai_shaped_response() {
        let body = json!({"data": [{"embedding": [1.0, 2.0, 3.0]}]});
        assert_eq!(normalize_embedding(&body), Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn normalizes_bare_array() {
        let body = json!([0.5, 0.25]);
        assert_eq!(normalize_embedding(&body), Some(vec![0.5, 0.25]));
    }

    #[test]
    fn normalizes_nested_array_wrapper() {
        let body = json!([[1.0, 2.0]]);
        assert_eq!(normalize_embedding(&body), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn rejects_shapes_with_no_numeric_payload() {
        let body = json!({"error": "bad request"});
        assert_eq!(normalize_embedding(&body), None);
    }

    #[test]
    fn matryoshka_truncation_keeps_prefix() {
        let full = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(truncate_matryoshka(full, 2), vec![1.0, 2.0]);
    }

    #[test]
    fn matryoshka_truncation_is_noop_when_shorter_or_equal() {
        let v = vec![1.0, 2.0];
        assert_eq!(truncate_matryoshka(v.clone(), 4), v);
    }
}

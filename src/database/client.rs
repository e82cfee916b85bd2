use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::PersistenceConfig;
use crate::utils::cosine_similarity;
use crate::utils::error::ApiError;

use super::auth::ServiceTokenIssuer;
use super::models::{
    Author, FileRecord, Message, MessageContent, Role, ScoredVector, Thread, VectorMetadata,
    VectorRecord,
};

/// The persistence gateway: uniform CRUD over threads, messages,
/// files, and vectors, fronting a PostgREST-shaped HTTP backend.
pub struct PersistenceClient {
    http: Client,
    base_url: String,
    issuer: ServiceTokenIssuer,
}

impl PersistenceClient {
    pub fn new(config: &PersistenceConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            issuer: ServiceTokenIssuer::new(&config.jwt_secret, config.token_ttl_seconds),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_header(&self) -> Result<String, ApiError> {
        let token = self
            .issuer
            .issue()
            .map_err(|e| ApiError::Internal(format!("failed to sign backend token: {e}")))?;
        Ok(format!("Bearer {token}"))
    }

    fn map_transport_error(
        &self,
        result: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<reqwest::Response, ApiError> {
        result.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ApiError::UpstreamTransient(format!("persistence backend unreachable: {e}"))
            } else {
                ApiError::Internal(format!("persistence backend request failed: {e}"))
            }
        })
    }

    fn map_status(status: StatusCode, context: &str) -> Option<ApiError> {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Some(ApiError::UpstreamAuth(format!("{context}: auth rejected by backend")))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                Some(ApiError::UpstreamRate(format!("{context}: backend rate limited")))
            }
            StatusCode::NOT_FOUND => Some(ApiError::NotFound(format!("{context}: not found"))),
            StatusCode::CONFLICT => Some(ApiError::Conflict(format!("{context}: conflict"))),
            s if s.is_server_error() => {
                Some(ApiError::UpstreamTransient(format!("{context}: backend error {s}")))
            }
            s if !s.is_success() => Some(ApiError::Internal(format!("{context}: unexpected status {s}"))),
            _ => None,
        }
    }

    // ----- Threads -----

    pub async fn create_thread(
        &self,
        model: &str,
        provider: &str,
        purpose: &str,
        author: Author,
    ) -> Result<Thread, ApiError> {
        let thread = Thread {
            thread_id: format!("thread-{}", Uuid::new_v4()),
            model: model.to_string(),
            provider: provider.to_string(),
            purpose: purpose.to_string(),
            author,
            tokens_spent: 0,
            cost: 0.0,
            created_at: Utc::now(),
        };

        let resp = self
            .http
            .post(self.url("/threads"))
            .header("Authorization", self.auth_header()?)
            .json(&thread)
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if let Some(err) = Self::map_status(resp.status(), "create_thread") {
            return Err(err);
        }
        debug!(thread_id = %thread.thread_id, "created thread");
        Ok(thread)
    }

    pub async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>, ApiError> {
        let resp = self
            .http
            .get(self.url(&format!("/threads?thread_id=eq.{thread_id}")))
            .header("Authorization", self.auth_header()?)
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if let Some(err) = Self::map_status(resp.status(), "get_thread") {
            return Err(err);
        }
        let rows: Vec<Thread> = resp
            .json()
            .await
            .map_err(|e| ApiError::Internal(format!("failed to parse thread: {e}")))?;
        Ok(rows.into_iter().next())
    }

    pub async fn update_thread_usage(
        &self,
        thread_id: &str,
        tokens_spent_delta: u64,
        cost_delta: f64,
    ) -> Result<(), ApiError> {
        let resp = self
            .http
            .patch(self.url(&format!("/threads?thread_id=eq.{thread_id}")))
            .header("Authorization", self.auth_header()?)
            .json(&json!({
                "tokens_spent_delta": tokens_spent_delta,
                "cost_delta": cost_delta,
            }))
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if let Some(err) = Self::map_status(resp.status(), "update_thread_usage") {
            return Err(err);
        }
        Ok(())
    }

    /// Cascade-deletes a thread's messages and vectors.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<(), ApiError> {
        let resp = self
            .http
            .delete(self.url(&format!("/threads?thread_id=eq.{thread_id}")))
            .header("Authorization", self.auth_header()?)
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if let Some(err) = Self::map_status(resp.status(), "delete_thread") {
            return Err(err);
        }
        Ok(())
    }

    // ----- Messages -----

    pub async fn create_message(
        &self,
        thread_id: &str,
        role: Role,
        text: &str,
        author: Author,
        file_refs: Vec<String>,
    ) -> Result<Message, ApiError> {
        let message = Message {
            message_id: format!("msg-{}", Uuid::new_v4()),
            thread_id: thread_id.to_string(),
            role,
            content: MessageContent::text(text),
            author,
            file_refs,
            created_at: Utc::now(),
        };

        let resp = self
            .http
            .post(self.url("/messages"))
            .header("Authorization", self.auth_header()?)
            .json(&message)
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if let Some(err) = Self::map_status(resp.status(), "create_message") {
            return Err(err);
        }
        Ok(message)
    }

    /// Edits a message's text content in place.
    pub async fn update_message(&self, message_id: &str, text: &str) -> Result<(), ApiError> {
        let resp = self
            .http
            .patch(self.url(&format!("/messages?message_id=eq.{message_id}")))
            .header("Authorization", self.auth_header()?)
            .json(&json!({ "content": MessageContent::text(text) }))
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if let Some(err) = Self::map_status(resp.status(), "update_message") {
            return Err(err);
        }
        Ok(())
    }

    pub async fn delete_message(&self, message_id: &str) -> Result<(), ApiError> {
        let resp = self
            .http
            .delete(self.url(&format!("/messages?message_id=eq.{message_id}")))
            .header("Authorization", self.auth_header()?)
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if let Some(err) = Self::map_status(resp.status(), "delete_message") {
            return Err(err);
        }
        Ok(())
    }

    // ----- Files -----

    #[allow(clippy::too_many_arguments)]
    pub async fn create_file(
        &self,
        filename: &str,
        mime: &str,
        size_bytes: u64,
        content_hash: &str,
        content_text: &str,
        address: &str,
        author: Author,
    ) -> Result<FileRecord, ApiError> {
        let now = Utc::now();
        let file = FileRecord {
            file_id: format!("file-{}", Uuid::new_v4()),
            filename: filename.to_string(),
            mime: mime.to_string(),
            size_bytes,
            content_hash: content_hash.to_string(),
            content_text: content_text.to_string(),
            address: address.to_string(),
            author,
            created_at: now,
            updated_at: now,
        };

        let resp = self
            .http
            .post(self.url("/files"))
            .header("Authorization", self.auth_header()?)
            .json(&file)
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if let Some(err) = Self::map_status(resp.status(), "create_file") {
            return Err(err);
        }
        Ok(file)
    }

    pub async fn find_file_by_hash(&self, content_hash: &str) -> Result<Option<FileRecord>, ApiError> {
        let resp = self
            .http
            .get(self.url(&format!("/files?content_hash=eq.{content_hash}")))
            .header("Authorization", self.auth_header()?)
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if let Some(err) = Self::map_status(resp.status(), "find_file_by_hash") {
            return Err(err);
        }
        let rows: Vec<FileRecord> = resp
            .json()
            .await
            .map_err(|e| ApiError::Internal(format!("failed to parse file: {e}")))?;
        Ok(rows.into_iter().next())
    }

    /// Updates a file's on-disk address (used both to "touch" an
    /// unchanged file on dedup, and to restore a soft-deleted one).
    pub async fn update_file_address(
        &self,
        content_hash: &str,
        new_address: &str,
    ) -> Result<FileRecord, ApiError> {
        let resp = self
            .http
            .patch(self.url(&format!("/files?content_hash=eq.{content_hash}")))
            .header("Authorization", self.auth_header()?)
            .json(&json!({
                "address": new_address,
                "updated_at": Utc::now(),
            }))
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if let Some(err) = Self::map_status(resp.status(), "update_file_address") {
            return Err(err);
        }
        let rows: Vec<FileRecord> = resp
            .json()
            .await
            .map_err(|e| ApiError::Internal(format!("failed to parse updated file: {e}")))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("file with hash {content_hash} vanished")))
    }

    pub async fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>, ApiError> {
        let resp = self
            .http
            .get(self.url(&format!("/files?file_id=eq.{file_id}")))
            .header("Authorization", self.auth_header()?)
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if let Some(err) = Self::map_status(resp.status(), "get_file") {
            return Err(err);
        }
        let rows: Vec<FileRecord> = resp
            .json()
            .await
            .map_err(|e| ApiError::Internal(format!("failed to parse file: {e}")))?;
        Ok(rows.into_iter().next())
    }

    /// Hard-deletes a file record. Soft-delete (marking `address =
    /// "deleted"` so a re-upload with the same hash restores it) goes
    /// through `update_file_address`; this is for permanent removal.
    pub async fn delete_file(&self, file_id: &str) -> Result<(), ApiError> {
        let resp = self
            .http
            .delete(self.url(&format!("/files?file_id=eq.{file_id}")))
            .header("Authorization", self.auth_header()?)
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if let Some(err) = Self::map_status(resp.status(), "delete_file") {
            return Err(err);
        }
        Ok(())
    }

    // ----- Vectors -----

    #[allow(clippy::too_many_arguments)]
    pub async fn create_vector(
        &self,
        thread_id: &str,
        embedding: Vec<f32>,
        content: &str,
        metadata: VectorMetadata,
        embed_tool: &str,
    ) -> Result<VectorRecord, ApiError> {
        let vector = VectorRecord {
            vector_id: format!("vec-{}", Uuid::new_v4()),
            thread_id: thread_id.to_string(),
            embedding,
            content: content.to_string(),
            metadata,
            embed_tool: embed_tool.to_string(),
            created_at: Utc::now(),
        };

        let resp = self
            .http
            .post(self.url("/vectors"))
            .header("Authorization", self.auth_header()?)
            .json(&vector)
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if let Some(err) = Self::map_status(resp.status(), "create_vector") {
            return Err(err);
        }
        Ok(vector)
    }

    /// Calls the backend's `search_vectors` RPC; if it is unavailable
    /// (404/transient), falls back to listing the thread's vectors and
    /// ranking them in-process with cosine similarity. The two paths
    /// are observationally identical: same ordering, same threshold
    /// semantics, truncated to `k`.
    pub async fn search_vectors(
        &self,
        query_embedding: &[f32],
        namespace: &str,
        thread_id: &str,
        threshold: f32,
        k: usize,
    ) -> Result<Vec<ScoredVector>, ApiError> {
        #[derive(Serialize)]
        struct SearchVectorsRequest<'a> {
            query_embedding: &'a [f32],
            namespace: &'a str,
            thread_id_param: &'a str,
            similarity_threshold: f32,
            match_count: usize,
        }

        let resp = self
            .http
            .post(self.url("/rpc/search_vectors"))
            .header("Authorization", self.auth_header()?)
            .json(&SearchVectorsRequest {
                query_embedding,
                namespace,
                thread_id_param: thread_id,
                similarity_threshold: threshold,
                match_count: k,
            })
            .send()
            .await;

        let resp = match self.map_transport_error(resp) {
            Ok(resp) => resp,
            Err(ApiError::UpstreamTransient(msg)) => {
                warn!("search_vectors RPC unreachable ({msg}); falling back to in-process ranking");
                return self
                    .fallback_search_vectors(query_embedding, namespace, thread_id, threshold, k)
                    .await;
            }
            Err(e) => return Err(e),
        };

        if resp.status() == StatusCode::NOT_FOUND {
            debug!("search_vectors RPC not found; falling back to in-process ranking");
            return self
                .fallback_search_vectors(query_embedding, namespace, thread_id, threshold, k)
                .await;
        }
        if let Some(err) = Self::map_status(resp.status(), "search_vectors") {
            return Err(err);
        }

        let rows: Vec<ScoredVector> = resp
            .json()
            .await
            .map_err(|e| ApiError::Internal(format!("failed to parse search_vectors: {e}")))?;
        Ok(rows)
    }

    async fn fallback_search_vectors(
        &self,
        query_embedding: &[f32],
        namespace: &str,
        thread_id: &str,
        threshold: f32,
        k: usize,
    ) -> Result<Vec<ScoredVector>, ApiError> {
        let vectors = self.list_thread_vectors(thread_id, namespace, None).await?;

        let mut scored: Vec<ScoredVector> = vectors
            .into_iter()
            .filter_map(|vector| {
                let similarity = cosine_similarity(query_embedding, &vector.embedding).ok()?;
                (similarity >= threshold).then_some(ScoredVector { vector, similarity })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    pub async fn list_thread_vectors(
        &self,
        thread_id: &str,
        namespace: &str,
        limit: Option<usize>,
    ) -> Result<Vec<VectorRecord>, ApiError> {
        let mut path = format!("/vectors?thread_id=eq.{thread_id}&metadata->>namespace=eq.{namespace}");
        if let Some(limit) = limit {
            path.push_str(&format!("&limit={limit}"));
        }

        let resp = self
            .http
            .get(self.url(&path))
            .header("Authorization", self.auth_header()?)
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if let Some(err) = Self::map_status(resp.status(), "list_thread_vectors") {
            return Err(err);
        }

        let rows: Vec<VectorRecord> = resp
            .json()
            .await
            .map_err(|e| ApiError::Internal(format!("failed to parse thread vectors: {e}")))?;
        Ok(rows)
    }

    /// Replaces a vector's embedding and source content in place (used
    /// when a chunk's source file is re-ingested with changed text).
    pub async fn update_vector(&self, vector_id: &str, embedding: Vec<f32>, content: &str) -> Result<(), ApiError> {
        let resp = self
            .http
            .patch(self.url(&format!("/vectors?vector_id=eq.{vector_id}")))
            .header("Authorization", self.auth_header()?)
            .json(&json!({ "embedding": embedding, "content": content }))
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if let Some(err) = Self::map_status(resp.status(), "update_vector") {
            return Err(err);
        }
        Ok(())
    }

    pub async fn delete_vector(&self, vector_id: &str) -> Result<(), ApiError> {
        let resp = self
            .http
            .delete(self.url(&format!("/vectors?vector_id=eq.{vector_id}")))
            .header("Authorization", self.auth_header()?)
            .send()
            .await;
        let resp = self.map_transport_error(resp)?;
        if let Some(err) = Self::map_status(resp.status(), "delete_vector") {
            return Err(err);
        }
        Ok(())
    }

    /// Recomputes a file's content hash from freshly-decoded text and
    /// compares it to the stored hash. Binary mismatches are logged
    /// and the caller proceeds; text mismatches are surfaced.
    pub fn verify_integrity(
        stored_hash: &str,
        recomputed_hash: &str,
        is_text_like: bool,
        context: &str,
    ) -> Result<(), ApiError> {
        if stored_hash == recomputed_hash {
            return Ok(());
        }
        if is_text_like {
            Err(ApiError::Integrity(format!(
                "{context}: content hash mismatch ({stored_hash} != {recomputed_hash})"
            )))
        } else {
            warn!(
                "{context}: content hash mismatch on binary file, proceeding ({stored_hash} != {recomputed_hash})"
            );
            Ok(())
        }
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::fs;
use tracing::{debug, warn};

use crate::config::{LimitsConfig, UploadsConfig};
use crate::database::{Author, PersistenceClient, VectorMetadata, VectorSource};
use crate::document::{Chunker, DocumentParser};
use crate::services::embedding::EmbeddingService;
use crate::utils::error::ApiError;
use crate::utils::hashing::sha256_hex;

const MAX_FILE_SIZE_BYTES: u64 = 256 * 1024 * 1024;

/// Result of ingesting one uploaded file.
#[derive(Debug, Clone)]
pub struct IngestedFile {
    pub file_id: String,
    pub stored_filename: String,
    pub size: u64,
}

/// File persistence/dedup plus the per-chunk vectorization sub-pipeline.
/// `content_hash` dedup and soft-delete restore are handled in
/// `PersistenceClient`; this module owns the on-disk write, the parse/
/// chunk/embed fan-out, and the size/extension validation gate.
pub struct IngestionPipeline {
    persistence: Arc<PersistenceClient>,
    parser: Arc<DocumentParser>,
    embedding: Arc<EmbeddingService>,
    chunker: Chunker,
    uploads: UploadsConfig,
    fanout: usize,
}

impl IngestionPipeline {
    pub fn new(
        persistence: Arc<PersistenceClient>,
        parser: Arc<DocumentParser>,
        embedding: Arc<EmbeddingService>,
        chunker: Chunker,
        uploads: UploadsConfig,
        limits: &LimitsConfig,
    ) -> Self {
        Self { persistence, parser, embedding, chunker, uploads, fanout: limits.embedding_fanout.max(1) }
    }

    /// Ingests one file's raw bytes: validates, dedups by content hash,
    /// writes to disk when needed, and creates/touches the backend
    /// record.
    pub async fn ingest_file(
        &self,
        filename: &str,
        bytes: &[u8],
        mime: &str,
        author: Author,
    ) -> Result<IngestedFile, ApiError> {
        let max_bytes = self.uploads.max_file_size_bytes.min(MAX_FILE_SIZE_BYTES);
        if bytes.len() as u64 > max_bytes {
            return Err(ApiError::Validation(format!(
                "file {filename} is {} bytes, exceeding the {max_bytes}-byte limit",
                bytes.len()
            )));
        }

        let ext = extension_of(filename);
        if ext.is_empty() {
            return Err(ApiError::Validation(format!("file {filename} has no recognizable extension")));
        }
        if !crate::document::formats::is_supported_extension(&ext) {
            return Err(ApiError::Validation(format!("file {filename} has an unsupported extension: .{ext}")));
        }

        let content_hash = sha256_hex(bytes);
        let is_text_like = crate::document::formats::is_text_like(&ext);

        if let Some(existing) = self.persistence.find_file_by_hash(&content_hash).await? {
            if !existing.is_deleted() {
                let touched = self.persistence.update_file_address(&content_hash, &existing.address).await?;
                debug!(file_id = %touched.file_id, "ingestion: deduped against existing file, touched timestamp");
                return Ok(IngestedFile {
                    file_id: touched.file_id,
                    stored_filename: touched.address,
                    size: touched.size_bytes,
                });
            }

            let stored_filename = format!("file-{}.{ext}", uuid::Uuid::new_v4());
            self.write_to_disk(&stored_filename, bytes).await?;
            let restored = self.persistence.update_file_address(&content_hash, &stored_filename).await?;
            debug!(file_id = %restored.file_id, "ingestion: restored soft-deleted file");
            return Ok(IngestedFile {
                file_id: restored.file_id,
                stored_filename,
                size: restored.size_bytes,
            });
        }

        let stored_filename = format!("file-{}.{ext}", uuid::Uuid::new_v4());
        self.write_to_disk(&stored_filename, bytes).await?;

        let content_text = if is_text_like {
            encoding_rs::UTF_8.decode(bytes).0.into_owned()
        } else {
            String::new()
        };

        let created = self
            .persistence
            .create_file(filename, mime, bytes.len() as u64, &content_hash, &content_text, &stored_filename, author)
            .await?;

        Ok(IngestedFile { file_id: created.file_id, stored_filename, size: created.size_bytes })
    }

    async fn write_to_disk(&self, stored_filename: &str, bytes: &[u8]) -> Result<(), ApiError> {
        let path = Path::new(&self.uploads.dir).join(stored_filename);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ApiError::Internal(format!("failed to create uploads dir: {e}")))?;
        }
        fs::write(&path, bytes)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to write {stored_filename}: {e}")))
    }

    /// Parses, chunks, and embeds one file's text, storing each chunk as
    /// a vector in namespace `files`. Prefers the backend's
    /// `content_text`; falls back to locating the file on disk across
    /// the configured search path.
    pub async fn vectorize_file(&self, thread_id: &str, file_id: &str) -> Result<usize, ApiError> {
        let file = self
            .persistence
            .get_file(file_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("file {file_id} not found for vectorization")))?;

        let text = if !file.content_text.is_empty() {
            file.content_text.clone()
        } else {
            match self.load_from_disk(&file.address, &file.filename, &file.mime).await {
                Some(text) => text,
                None => {
                    warn!(file_id, "vectorize_file: could not locate text content, skipping");
                    return Ok(0);
                }
            }
        };

        if text.trim().is_empty() {
            return Ok(0);
        }

        let chunks = self.chunker.chunk(&text);
        let ext = extension_of(&file.filename);
        let file_name = file.filename.clone();

        let results: Vec<Result<bool, ApiError>> = stream::iter(chunks.into_iter().enumerate())
            .map(|(index, chunk)| {
                let embedding = self.embedding.clone();
                let persistence = self.persistence.clone();
                let thread_id = thread_id.to_string();
                let file_id = file_id.to_string();
                let file_name = file_name.clone();
                let ext = ext.clone();
                async move {
                    let Some(vector) = embedding.embed(&chunk.content).await else {
                        return Ok(false);
                    };
                    if vector.iter().any(|v| !v.is_finite()) {
                        warn!(file_id, index, "vectorize_file: skipping chunk with non-finite embedding values");
                        return Ok(false);
                    }

                    let metadata = VectorMetadata {
                        namespace: "files".to_string(),
                        source: Some(VectorSource::File),
                        file_id: Some(file_id.clone()),
                        file_name: Some(file_name),
                        message_id: None,
                        chunk_index: Some(index),
                        role: None,
                    };
                    persistence
                        .create_vector(&thread_id, vector, &chunk.content, metadata, &format!("parser:{ext}"))
                        .await?;
                    Ok(true)
                }
            })
            .buffer_unordered(self.fanout)
            .collect()
            .await;

        let stored = results.into_iter().filter_map(Result::ok).filter(|ok| *ok).count();
        Ok(stored)
    }

    /// Tries every configured search-path directory joined with
    /// `address`, then — if `address` is a host-style absolute path
    /// (e.g. `/Users/...` from a bind-mount recorded outside the
    /// container) — remaps it onto each of the container's own
    /// candidate roots before giving up.
    async fn load_from_disk(&self, address: &str, filename: &str, mime: &str) -> Option<String> {
        for base in &self.uploads.search_path {
            let path: PathBuf = Path::new(base).join(address);
            if let Ok(bytes) = fs::read(&path).await {
                return self.parse_bytes(filename, &bytes, mime).await;
            }
        }

        for candidate in remap_host_path(address) {
            if let Ok(bytes) = fs::read(&candidate).await {
                debug!(%address, remapped = %candidate.display(), "vectorize_file: resolved file via container path remap");
                return self.parse_bytes(filename, &bytes, mime).await;
            }
        }

        None
    }

    async fn parse_bytes(&self, filename: &str, bytes: &[u8], mime: &str) -> Option<String> {
        match self.parser.parse(filename, bytes, mime).await {
            Ok(parsed) => Some(parsed.text),
            Err(e) => {
                warn!("vectorize_file: parse failed for {filename}: {e}");
                None
            }
        }
    }
}

/// Host-style upload paths recorded by a client running outside the
/// container (e.g. `/Users/alice/uploads/report.pdf` on macOS) don't
/// exist inside it; try the container roots a bind mount would
/// plausibly have placed that same tree under.
const CONTAINER_PATH_PREFIXES: &[&str] = &["/app", "/usr/src/app", "/tmp"];

fn remap_host_path(address: &str) -> Vec<PathBuf> {
    if !address.starts_with("/Users/") {
        return Vec::new();
    }
    let rest = address.trim_start_matches("/Users");
    CONTAINER_PATH_PREFIXES
        .iter()
        .map(|prefix| Path::new(prefix).join(rest.trim_start_matches('/')))
        .collect()
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> IngestionPipeline {
        let providers = crate::config::ProvidersConfig {
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
        let limits = LimitsConfig {
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
        let limiters = Arc::new(crate::utils::limiters::Limiters::new(&limits));
        let embedding = Arc::new(EmbeddingService::new(&providers, limiters.clone()));
        let llm_client = Arc::new(crate::services::llm::LlmClient::new(
            &providers.llm,
            std::time::Duration::from_secs(60),
            limiters,
        ));
        let parser = Arc::new(DocumentParser::new(llm_client));
        let persistence = Arc::new(PersistenceClient::new(&crate::config::PersistenceConfig {
            base_url: "http://localhost:3000".to_string(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_seconds: 3600,
            request_timeout_seconds: 15,
        }));
        let chunker = Chunker::new(500, 50);
        let uploads = UploadsConfig {
            dir: "/tmp/rag-gateway-test-uploads".to_string(),
            search_path: vec!["/tmp/rag-gateway-test-uploads".to_string()],
            max_file_size_bytes: 1024,
        };
        IngestionPipeline::new(persistence, parser, embedding, chunker, uploads, &limits)
    }

    #[test]
    fn extension_of_lowercases_and_strips_dot() {
        assert_eq!(extension_of("Report.PDF"), "pdf");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("no_extension"), "");
    }

    #[tokio::test]
    async fn rejects_oversize_files() {
        let pipeline = pipeline();
        let bytes = vec![0u8; 2048];
        let author = Author { author_type: "user".to_string(), user_id: "u1".to_string(), name: String::new() };
        let err = pipeline.ingest_file("big.txt", &bytes, "text/plain", author).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_files_with_no_extension() {
        let pipeline = pipeline();
        let author = Author { author_type: "user".to_string(), user_id: "u1".to_string(), name: String::new() };
        let err = pipeline.ingest_file("README", b"hello", "text/plain", author).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_unsupported_extensions() {
        let pipeline = pipeline();
        let author = Author { author_type: "user".to_string(), user_id: "u1".to_string(), name: String::new() };
        let err = pipeline.ingest_file("payload.exe", b"MZ", "application/octet-stream", author).await.unwrap_err();
        match err {
            ApiError::Validation(msg) => assert!(msg.contains("unsupported extension")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn remap_host_path_only_applies_to_users_prefixed_addresses() {
        assert!(remap_host_path("/app/uploads/report.pdf").is_empty());

        let remapped = remap_host_path("/Users/alice/uploads/report.pdf");
        assert_eq!(
            remapped,
            vec![
                PathBuf::from("/app/uploads/report.pdf"),
                PathBuf::from("/usr/src/app/uploads/report.pdf"),
                PathBuf::from("/tmp/uploads/report.pdf"),
            ]
        );
    }
}

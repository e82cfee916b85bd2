use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub persistence: PersistenceConfig,
    pub uploads: UploadsConfig,
    pub providers: ProvidersConfig,
    pub rag: RagConfig,
    pub limits: LimitsConfig,
    pub prompts: PromptsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: u64,
}

/// Settings for the persistence gateway: a PostgREST-shaped HTTP
/// backend fronting threads, messages, files, vectors.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PersistenceConfig {
    pub base_url: String,
    pub jwt_secret: String,
    pub token_ttl_seconds: u64,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UploadsConfig {
    pub dir: String,
    /// Search path, in order, used when content_text must be recovered
    /// from disk rather than the database.
    pub search_path: Vec<String>,
    pub max_file_size_bytes: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProviderCredential {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl ProviderCredential {
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    /// LLM provider used for completions, summarization, and tool-use
    /// classification. Keyed by provider name at the call site.
    pub llm: ProviderCredential,
    pub llm_model: String,
    pub embedding: ProviderCredential,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    /// Preferred web-search provider; falls back to any other
    /// configured provider when absent.
    pub search_preference: String,
    pub tavily: ProviderCredential,
    pub linkup: ProviderCredential,
    pub firecrawl: ProviderCredential,
    pub transcript: ProviderCredential,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RagConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_top_k: usize,
    pub similarity_threshold: f32,
    pub max_context_tokens: usize,
    pub weight_query: f32,
    pub weight_query_context: f32,
    pub weight_local_context: f32,
    pub use_summarization: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LimitsConfig {
    pub embedding_fanout: usize,
    pub embedding_concurrency: usize,
    pub db_search_concurrency: usize,
    pub llm_concurrency: usize,
    pub acquire_timeout_ms: u64,
    pub parse_timeout_seconds: u64,
    pub embedding_timeout_seconds: u64,
    pub summarize_timeout_seconds: u64,
    pub classify_timeout_seconds: u64,
    pub enrichment_timeout_seconds: u64,
    pub llm_completion_timeout_seconds: u64,
}

impl LimitsConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms.max(1))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptsConfig {
    pub system_preamble: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(true))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    pub fn config_path(&self) -> PathBuf {
        PathBuf::from("config/settings.toml")
    }
}

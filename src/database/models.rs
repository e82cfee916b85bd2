use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation thread. `tokens_spent`/`cost` are monotonically
/// non-decreasing; only the orchestrator appends to them, never
/// decrements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub thread_id: String,
    pub model: String,
    pub provider: String,
    pub purpose: String,
    pub author: Author,
    #[serde(default)]
    pub tokens_spent: u64,
    #[serde(default)]
    pub cost: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    #[serde(rename = "type")]
    pub author_type: String,
    #[serde(rename = "user-id")]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Structured message content block. The core path only ever produces
/// `type="text"` blocks; richer block types are not modeled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// A persisted chat message. Immutable after creation in the core path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub thread_id: String,
    pub role: Role,
    pub content: MessageContent,
    pub author: Author,
    #[serde(default)]
    pub file_refs: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// An uploaded file's record. `content_hash` is a uniqueness key
/// across uploads; `address = "deleted"` marks a soft-deleted blob
/// that a matching re-upload restores in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: String,
    pub filename: String,
    pub mime: String,
    pub size_bytes: u64,
    pub content_hash: String,
    #[serde(default)]
    pub content_text: String,
    pub address: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn is_deleted(&self) -> bool {
        self.address == "deleted"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorSource {
    File,
    Message,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub namespace: String,
    pub source: Option<VectorSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// An embedded chunk. Owned by its thread; cascade-deleted with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub vector_id: String,
    pub thread_id: String,
    pub embedding: Vec<f32>,
    pub content: String,
    pub metadata: VectorMetadata,
    pub embed_tool: String,
    pub created_at: DateTime<Utc>,
}

/// A vector plus the similarity score attached by `search_vectors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredVector {
    #[serde(flatten)]
    pub vector: VectorRecord,
    pub similarity: f32,
}

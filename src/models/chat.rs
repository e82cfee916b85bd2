use serde::{Deserialize, Serialize};

use crate::database::Author;

/// Chat-completions request payload, accepted as either a JSON body
/// or the `json` field of a multipart upload.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub provider: String,
    pub model: String,
    pub purpose: String,
    pub author: Author,
    pub thread_id: Option<String>,
    pub messages: Vec<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub thread_id: String,
    pub message_id: String,
    pub content: String,
    pub tokens_spent: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// `/api/v1/files` multipart response.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub status: String,
    pub message: String,
    pub result: Vec<UploadedFileResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedFileResult {
    #[serde(rename = "file-id")]
    pub file_id: String,
    pub size: u64,
    pub filename: String,
    pub stored_filename: String,
}

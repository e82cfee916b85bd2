use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;

use crate::models::chat::{ChatCompletionRequest, ChatCompletionResponse};
use crate::state::AppState;
use crate::utils::error::ApiError;

const IMPLEMENTED_PROVIDERS: &[&str] = &["openai", "deepseek", "anthropic"];
const PLANNED_PROVIDERS: &[&str] = &["gemini"];

/// `POST /api/v1/chat/completions`. Accepts `application/json` or
/// `multipart/form-data` with a `json` field carrying the payload and
/// any other fields treated as file uploads.
pub async fn chat_completions(State(state): State<AppState>, request: Request) -> Response {
    state.metrics.record_request();

    let is_multipart = request
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let outcome = if is_multipart {
        handle_multipart(&state, request).await
    } else {
        handle_json(&state, request).await
    };

    match outcome {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            state.metrics.record_request_failed();
            e.into_response()
        }
    }
}

async fn handle_json(state: &AppState, request: Request) -> Result<ChatCompletionResponse, ApiError> {
    let Json(payload) = Json::<ChatCompletionRequest>::from_request(request, state)
        .await
        .map_err(|e| ApiError::Validation(format!("malformed request body: {e}")))?;
    run_completion(state, payload, Vec::new()).await
}

struct UploadedField {
    filename: String,
    bytes: Vec<u8>,
    mime: String,
}

async fn handle_multipart(state: &AppState, request: Request) -> Result<ChatCompletionResponse, ApiError> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| ApiError::Validation(format!("invalid multipart body: {e}")))?;

    let mut payload: Option<ChatCompletionRequest> = None;
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart field: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "json" {
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::Validation(format!("invalid json field: {e}")))?;
            payload = Some(
                serde_json::from_str(&text)
                    .map_err(|e| ApiError::Validation(format!("malformed json payload: {e}")))?,
            );
        } else {
            let filename = field.file_name().unwrap_or("upload.bin").to_string();
            let mime = field.content_type().unwrap_or("application/octet-stream").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::Validation(format!("failed to read upload field: {e}")))?
                .to_vec();
            uploads.push(UploadedField { filename, bytes, mime });
        }
    }

    let payload = payload.ok_or_else(|| ApiError::Validation("multipart body missing 'json' field".to_string()))?;
    run_completion(state, payload, uploads).await
}

/// Inline multipart uploads are ingested first and attached to the last
/// message of the payload — the one the client is asking about.
async fn run_completion(
    state: &AppState,
    mut payload: ChatCompletionRequest,
    uploads: Vec<UploadedField>,
) -> Result<ChatCompletionResponse, ApiError> {
    validate_provider(&payload.provider)?;
    state
        .tokenizer
        .validate(&payload.provider, &payload.model)
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    if payload.messages.is_empty() {
        return Err(ApiError::Validation("messages must not be empty".to_string()));
    }

    if !uploads.is_empty() {
        let mut new_file_ids = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let ingested = state
                .ingestion
                .ingest_file(&upload.filename, &upload.bytes, &upload.mime, payload.author.clone())
                .await?;
            new_file_ids.push(ingested.file_id);
        }
        if let Some(last) = payload.messages.last_mut() {
            last.attachments.extend(new_file_ids);
        }
    }

    info!(provider = %payload.provider, model = %payload.model, "chat_completions: dispatching to orchestrator");
    let result = state.orchestrator.complete(payload).await?;

    Ok(ChatCompletionResponse {
        thread_id: result.thread_id,
        message_id: result.message_id,
        content: result.content,
        tokens_spent: result.tokens_spent,
        cost: result.cost,
    })
}

fn validate_provider(provider: &str) -> Result<(), ApiError> {
    if PLANNED_PROVIDERS.contains(&provider) {
        return Err(ApiError::NotImplemented(format!("provider '{provider}' is not yet implemented")));
    }
    if !IMPLEMENTED_PROVIDERS.contains(&provider) {
        return Err(ApiError::Validation(format!("unknown provider: {provider}")));
    }
    Ok(())
}

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use crate::database::Author;
use crate::models::chat::{UploadResponse, UploadedFileResult};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// `POST /api/v1/files`. Fields: one or more `files` entries, plus
/// optional `author_id` / `author_type`. Individual file failures do
/// not abort the batch; the response reflects which files succeeded.
pub async fn upload_files(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut author_id: Option<String> = None;
    let mut author_type: Option<String> = None;
    let mut files: Vec<(String, String, Vec<u8>)> = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return ApiError::Validation(format!("malformed multipart field: {e}")).into_response(),
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "author_id" => {
                author_id = field.text().await.ok();
            }
            "author_type" => {
                author_type = field.text().await.ok();
            }
            "files" | "files[]" | "file" => {
                let filename = field.file_name().unwrap_or("upload.bin").to_string();
                let mime = field.content_type().unwrap_or("application/octet-stream").to_string();
                let bytes = match field.bytes().await {
                    Ok(bytes) => bytes.to_vec(),
                    Err(e) => return ApiError::Validation(format!("failed to read {filename}: {e}")).into_response(),
                };
                files.push((filename, mime, bytes));
            }
            other => {
                warn!(field = other, "upload_files: ignoring unrecognized field");
            }
        }
    }

    if files.is_empty() {
        return ApiError::Validation("no files provided".to_string()).into_response();
    }

    let author = Author {
        author_type: author_type.unwrap_or_else(|| "user".to_string()),
        user_id: author_id.unwrap_or_else(|| "anonymous".to_string()),
        name: String::new(),
    };

    let mut result = Vec::with_capacity(files.len());
    let mut failures = 0usize;

    for (filename, mime, bytes) in files {
        match state.ingestion.ingest_file(&filename, &bytes, &mime, author.clone()).await {
            Ok(ingested) => result.push(UploadedFileResult {
                file_id: ingested.file_id,
                size: ingested.size,
                filename,
                stored_filename: ingested.stored_filename,
            }),
            Err(e) => {
                failures += 1;
                warn!(filename, "upload_files: failed to ingest: {e}");
            }
        }
    }

    if result.is_empty() {
        state.metrics.record_request_failed();
        return ApiError::Validation("all uploaded files failed to ingest".to_string()).into_response();
    }

    let status = if failures > 0 { StatusCode::MULTI_STATUS } else { StatusCode::OK };
    let message = if failures > 0 {
        format!("{} file(s) uploaded, {failures} failed", result.len())
    } else {
        format!("{} file(s) uploaded", result.len())
    };

    (status, Json(UploadResponse { status: "ok".to_string(), message, result })).into_response()
}

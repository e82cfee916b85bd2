use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// The gateway's error taxonomy. Every variant carries a stable short code
/// and a long message that is safe to show end users.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Content-hash mismatch or similar integrity concern.
    #[error("{0}")]
    Integrity(String),

    #[error("{0}")]
    UpstreamTransient(String),

    #[error("{0}")]
    UpstreamAuth(String),

    #[error("{0}")]
    UpstreamRate(String),

    #[error("{0}")]
    Internal(String),

    /// A provider/model combination is recognized but not wired up yet.
    /// Unknown combinations are `Validation` (400); recognized-but-dormant
    /// ones (e.g. a provider with a stub handler) are this variant (501).
    #[error("{0}")]
    NotImplemented(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Integrity(_) => "integrity",
            ApiError::UpstreamTransient(_) => "upstream_transient",
            ApiError::UpstreamAuth(_) => "upstream_auth",
            ApiError::UpstreamRate(_) => "upstream_rate",
            ApiError::Internal(_) => "internal",
            ApiError::NotImplemented(_) => "not_implemented",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Integrity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::UpstreamTransient(_) => StatusCode::BAD_GATEWAY,
            ApiError::UpstreamAuth(_) => StatusCode::BAD_GATEWAY,
            ApiError::UpstreamRate(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(msg) | ApiError::UpstreamTransient(msg) => {
                tracing::error!(code = self.code(), "{msg}");
            }
            other => {
                tracing::warn!(code = self.code(), "{other}");
            }
        }

        let body = Json(ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

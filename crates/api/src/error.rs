use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use testu_core::error::CoreError;
use testu_store::StoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`StoreError`] for persistence,
/// and adds HTTP-specific variants. Implements [`IntoResponse`] to produce
/// consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `testu_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A persistence error from `testu_store`.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => classify_core_error(core),

            // --- Storage errors ---
            AppError::Store(StoreError::InvalidId(id)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_ID",
                format!("Invalid report id: {id}"),
            ),
            AppError::Store(err) => {
                tracing::error!(error = %err, "Storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Map a domain error to an HTTP status, error code, and message.
fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        CoreError::Unauthorized { .. } => {
            (StatusCode::FORBIDDEN, "UNAUTHORIZED_AGENT", err.to_string())
        }
        CoreError::InvalidSubmission(_) => {
            (StatusCode::BAD_REQUEST, "INVALID_SUBMISSION", err.to_string())
        }
        CoreError::InvalidReport { .. } => {
            (StatusCode::BAD_REQUEST, "INVALID_REPORT", err.to_string())
        }
        CoreError::UnknownJob(_) => (StatusCode::NOT_FOUND, "UNKNOWN_JOB", err.to_string()),
        CoreError::ChannelNotFound(_) => {
            (StatusCode::NOT_FOUND, "CHANNEL_NOT_FOUND", err.to_string())
        }
        CoreError::ChannelGone(_) => (StatusCode::GONE, "CHANNEL_GONE", err.to_string()),
        CoreError::DuplicateRegistration(_) => {
            (StatusCode::CONFLICT, "DUPLICATE_REGISTRATION", err.to_string())
        }
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

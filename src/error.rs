//! Error types for the book catalog service

use std::collections::BTreeSet;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error kinds reported in the `error` field of a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ValidationError,
    ConflictError,
    NotFoundError,
    StoreError,
    TimeoutError,
    InternalError,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store call timed out: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFoundError,
            AppError::Validation(_) => ErrorKind::ValidationError,
            AppError::Conflict(_) => ErrorKind::ConflictError,
            AppError::Database(_) => ErrorKind::StoreError,
            AppError::Timeout(_) => ErrorKind::TimeoutError,
            AppError::Internal(_) => ErrorKind::InternalError,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        // Several fields may carry the same message; report each once.
        let messages: BTreeSet<String> = errors
            .field_errors()
            .into_values()
            .flatten()
            .map(|e| match &e.message {
                Some(msg) => msg.to_string(),
                None => e.code.to_string(),
            })
            .collect();
        AppError::Validation(messages.into_iter().collect::<Vec<_>>().join("; "))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::Timeout(msg) => {
                tracing::error!("Store timeout: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: format!("{:?}", self.kind()),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_and_validation_map_to_bad_request() {
        let conflict = AppError::Conflict("dup".into()).into_response();
        let invalid = AppError::Validation("missing".into()).into_response();
        assert_eq!(conflict.status(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_failures_map_to_internal_error() {
        let db = AppError::Database(sqlx::Error::PoolTimedOut).into_response();
        let timeout = AppError::Timeout("list".into()).into_response();
        assert_eq!(db.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(timeout.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}

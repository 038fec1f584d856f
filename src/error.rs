use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::models::{ErrorCode, ErrorEnvelope};
use crate::rate_limit::RateLimitError;
use crate::response::ResponseFactory;

/// Application-wide error types.
///
/// Middleware units return these for *unexpected* failures; the chain
/// converts them into an `INTERNAL_ERROR` envelope. Expected denials
/// (bad token, exhausted quota) are short-circuits, never errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid rate limit configuration: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("Rate limit store failure: {0}")]
    StoreError(String),

    #[error("Upstream call failed: {0}")]
    Upstream(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Operation timed out: {0}")]
    OperationTimeout(String),
}

impl AppError {
    /// Client-facing envelope for this error.
    ///
    /// Only client errors echo their message; everything else gets a
    /// generic message so internal details stay server-side.
    pub fn envelope(&self) -> ErrorEnvelope {
        match self {
            AppError::BadRequest(msg) => ErrorEnvelope::bad_request(msg.as_str()),
            AppError::NotFound(msg) => ErrorEnvelope::new(ErrorCode::NotFound, msg.as_str()),
            AppError::StoreError(_) | AppError::Upstream(_) => ErrorEnvelope::new(
                ErrorCode::UpstreamError,
                "A dependency is temporarily unavailable. Please try again later.",
            ),
            AppError::OperationTimeout(_) => {
                ErrorEnvelope::timeout("Operation timed out. Please try again.")
            }
            AppError::ConfigError(_)
            | AppError::RateLimit(_)
            | AppError::SerializationError(_)
            | AppError::Internal(_) => ErrorEnvelope::internal(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full error details server-side for debugging
        // but only expose sanitized messages to clients
        tracing::error!(error = %self, "Request failed");

        ResponseFactory::build(&self.envelope())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

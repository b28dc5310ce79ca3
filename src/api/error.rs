//! Unified API error handling with structured responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// API error type with structured responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Structured error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        match &self {
            ApiError::Internal(msg) => {
                error!(error_code = code, message = %msg, "API error");
            }
            _ => {
                tracing::debug!(error_code = code, message = %message, "Client error");
            }
        }

        let body = ErrorResponse {
            error: message,
            code,
        };

        (status, Json(body)).into_response()
    }
}

/// Map filesystem errors from the read/download endpoints.
impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ApiError::NotFound("File not found".to_string()),
            _ => ApiError::Internal(format!("Failed to read file: {err}")),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::not_found("").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::bad_request("").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::forbidden("").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::internal("").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_io_error_mapping() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(ApiError::from(err), ApiError::NotFound(_)));

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(ApiError::from(err), ApiError::Internal(_)));
    }
}

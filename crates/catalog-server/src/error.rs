//! HTTP error responses

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use catalog_registry::Error;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Error raised by the registry
    #[error(transparent)]
    Registry(#[from] Error),

    /// Request body is not JSON
    #[error("Invalid request: malformed JSON body: {0}")]
    MalformedBody(String),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message
    pub error: String,
    /// Machine-readable error class
    pub code: String,
}

impl ApiError {
    /// Status code and error class for this error
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::MalformedBody(_) | ApiError::Registry(Error::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            ApiError::Registry(Error::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Registry(Error::Conflict(_)) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Registry(Error::Transport(_)) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ApiError::Registry(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status_codes() {
        let cases = [
            (Error::Validation("missing ID".into()), StatusCode::BAD_REQUEST),
            (Error::NotFound("Device with ID 1".into()), StatusCode::NOT_FOUND),
            (Error::Conflict("Service with ID 1".into()), StatusCode::CONFLICT),
            (Error::Transport("refused".into()), StatusCode::BAD_GATEWAY),
            (Error::CorruptState("truncated".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).into_response().status(), expected);
        }

        assert_eq!(
            ApiError::MalformedBody("eof".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}

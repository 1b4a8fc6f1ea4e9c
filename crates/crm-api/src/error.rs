//! API error types and JSON error response formatting.
//!
//! Every error response has the shape `{success: false, message, error}`.
//! Internal failures carry their detail in `error` only in development.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crm_chat::ChatError;
use crm_core::config::Environment;

const INTERNAL_ERROR_TEXT: &str = "Internal server error";

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    /// Human-readable error message.
    pub message: String,
    /// Machine-readable code, or the failure detail in development.
    pub error: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid input.
    BadRequest(String),
    /// 413 Payload Too Large - too many or too large uploads.
    PayloadTooLarge(String),
    /// 429 Too Many Requests.
    TooManyRequests,
    /// 500 Internal Server Error. `detail` is only exposed when `expose` is set.
    Internal {
        message: String,
        detail: String,
        expose: bool,
    },
}

impl ApiError {
    pub fn internal(
        message: impl Into<String>,
        detail: impl ToString,
        environment: Environment,
    ) -> Self {
        ApiError::Internal {
            message: message.into(),
            detail: detail.to_string(),
            expose: environment == Environment::Development,
        }
    }

    /// Map a router failure: validation errors are the caller's fault,
    /// everything else is a server fault.
    pub fn from_chat(err: ChatError, environment: Environment) -> Self {
        if err.is_client_error() {
            ApiError::BadRequest(err.to_string())
        } else {
            tracing::error!(error = %err, "Chat request failed");
            ApiError::internal("Failed to process chat message", err, environment)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "bad_request".to_string()),
            ApiError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                msg,
                "payload_too_large".to_string(),
            ),
            ApiError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
                "too_many_requests".to_string(),
            ),
            ApiError::Internal {
                message,
                detail,
                expose,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                message,
                if expose {
                    detail
                } else {
                    INTERNAL_ERROR_TEXT.to_string()
                },
            ),
        };

        let body = ErrorBody {
            success: false,
            message,
            error,
        };

        (status, Json(body)).into_response()
    }
}

//! HTTP request handlers for the payhook API.
//!
//! Handlers are grouped by functionality:
//! - `webhooks` - signed webhook intake and admission
//! - `setup` - one-time webhook subscription registration
//! - `health` - health and liveness probes
//!
//! Error responses share one JSON shape carrying a code from the error
//! taxonomy (E1001-E3001), a human-readable message, and whether the
//! sender should try again.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use payhook_core::PayhookError;
use serde::Serialize;

pub mod health;
pub mod setup;
pub mod webhooks;

pub use health::{health_check, liveness_check};
pub use setup::setup_webhook;
pub use webhooks::receive_webhook;

/// Error response with code and message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error code from the taxonomy
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// Whether sending the same request again may succeed
    pub retryable: bool,
}

/// Creates a standardized error response.
pub(crate) fn error_response(status: StatusCode, error: &PayhookError) -> Response {
    let body = ErrorResponse {
        error: ErrorDetail {
            code: error.code().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
        },
    };

    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_keeps_status() {
        let response =
            error_response(StatusCode::FORBIDDEN, &PayhookError::unauthenticated("bad signature"));

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}

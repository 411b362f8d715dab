//! One-time webhook subscription setup.
//!
//! Registers this service's public URL with the platform. The platform then
//! sends a verification payload to `/webhooks`, whose token is logged for the
//! operator to submit back.

use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use payhook_core::PayhookError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use super::{error_response, ErrorDetail, ErrorResponse};
use crate::AppState;

/// Resource types every new subscription listens to.
const SUBSCRIPTION_TYPES: &[&str] = &["Company"];

/// Errors from the subscription setup flow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    /// Remote API answered with something other than 201.
    #[error("[E3002] Failed to create subscription (HTTP {status}): {body}")]
    Rejected {
        /// Upstream status code
        status: u16,
        /// Upstream response body
        body: String,
    },

    /// Remote API could not be reached.
    #[error("[E3003] Error creating subscription: {0}")]
    Unreachable(String),

    /// HTTP client could not be built.
    #[error("[E3001] Internal error: {0}")]
    Client(String),
}

impl SetupError {
    /// Returns the error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "E3002",
            Self::Unreachable(_) => "E3003",
            Self::Client(_) => "E3001",
        }
    }

    /// Whether repeating the setup call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::Unreachable(_) => true,
            Self::Client(_) => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Rejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            },
            Self::Unreachable(_) => StatusCode::BAD_GATEWAY,
            Self::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SetupError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
                retryable: self.is_retryable(),
            },
        };
        (self.status(), Json(body)).into_response()
    }
}

/// A subscription created by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Subscription {
    /// Platform-assigned subscription identifier.
    #[serde(default)]
    pub uuid: String,
}

/// Client for the platform's webhook subscription endpoint.
#[derive(Debug, Clone)]
pub struct SubscriptionClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl SubscriptionClient {
    /// Creates a client for `{base_url}/v1/webhook_subscriptions`.
    ///
    /// # Errors
    ///
    /// Returns `SetupError::Client` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SetupError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SetupError::Client(e.to_string()))?;

        Ok(Self { client, base_url: base_url.into(), api_token: api_token.into() })
    }

    fn subscriptions_url(&self) -> String {
        format!("{}/v1/webhook_subscriptions", self.base_url.trim_end_matches('/'))
    }

    /// Creates a subscription that delivers to `webhook_url`.
    ///
    /// # Errors
    ///
    /// Returns `Unreachable` on transport failure and `Rejected` for any
    /// response other than 201 Created.
    pub async fn create_subscription(&self, webhook_url: &str) -> Result<Subscription, SetupError> {
        let response = self
            .client
            .post(self.subscriptions_url())
            .bearer_auth(&self.api_token)
            .json(&json!({ "url": webhook_url, "subscription_types": SUBSCRIPTION_TYPES }))
            .send()
            .await
            .map_err(|e| SetupError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| SetupError::Unreachable(e.to_string()))?;

        if status != reqwest::StatusCode::CREATED {
            return Err(SetupError::Rejected { status: status.as_u16(), body });
        }

        Ok(serde_json::from_str(&body).unwrap_or_else(|e| {
            warn!(error = %e, "subscription created but response body was not parseable");
            Subscription { uuid: String::new() }
        }))
    }
}

/// Request body for subscription setup.
#[derive(Debug, Default, Deserialize)]
pub struct SetupRequest {
    /// Public URL of this service's `/webhooks` endpoint
    #[serde(default)]
    pub webhook_url: String,
}

/// Response after a subscription is created.
#[derive(Debug, Serialize)]
pub struct SetupResponse {
    /// Platform-assigned subscription identifier
    pub subscription_uuid: String,
    /// Next step for the operator
    pub message: String,
}

/// Creates the platform webhook subscription for `webhook_url`.
///
/// # Responses
///
/// - 200: subscription created
/// - 400: body missing, not JSON, or `webhook_url` empty
/// - 502: platform unreachable
/// - other: the platform's own status for a rejected request
#[instrument(name = "setup_webhook", skip(state, body))]
pub async fn setup_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let request: SetupRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &PayhookError::malformed(format!("invalid request body: {e}")),
            );
        },
    };

    let webhook_url = request.webhook_url.trim();
    if webhook_url.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &PayhookError::malformed("webhook_url is required"),
        );
    }

    info!(url = %webhook_url, "creating webhook subscription");

    match state.subscriptions.create_subscription(webhook_url).await {
        Ok(subscription) => {
            info!(
                uuid = %subscription.uuid,
                "subscription created; the platform is now sending the verification payload to /webhooks"
            );
            let response = SetupResponse {
                message: format!(
                    "Subscription created with UUID: {}. Check your server logs for the verification token.",
                    subscription.uuid
                ),
                subscription_uuid: subscription.uuid,
            };
            (StatusCode::OK, Json(response)).into_response()
        },
        Err(e) => {
            error!(code = e.code(), error = %e, "webhook subscription setup failed");
            e.into_response()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_status_is_passed_through() {
        let error = SetupError::Rejected { status: 422, body: "{}".to_string() };
        assert_eq!(error.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(SetupError::Unreachable("refused".into()).status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn subscriptions_url_ignores_trailing_slash() {
        let client =
            SubscriptionClient::new("http://localhost:9000/", "token", Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.subscriptions_url(), "http://localhost:9000/v1/webhook_subscriptions");
    }
}

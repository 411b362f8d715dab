//! Webhook intake handler.
//!
//! Runs behind the signature middleware, so the body it sees is the exact
//! verified byte sequence. Events are admitted to the processing queue
//! without blocking; a full queue is reported to the sender as 503 so the
//! platform retries later.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use payhook_core::{InboundPayload, Job, PayhookError};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use super::error_response;
use crate::{middleware::RawBody, AppState};

/// Body returned for an acknowledged verification handshake.
pub const VERIFICATION_ACK: &str = "Verification payload acknowledged.";

/// Response for an admitted event.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    /// Always `accepted`
    pub status: &'static str,
    /// Jobs waiting in the queue after admission
    pub queue_depth: usize,
}

/// Receives a signed webhook and routes it by shape.
///
/// # Responses
///
/// - 200: verification handshake acknowledged, nothing queued
/// - 202: event admitted to the processing queue
/// - 400: body is not a JSON object or has an unrecognized shape
/// - 500: verified body missing from request extensions
/// - 503: queue full or shutting down
#[instrument(name = "receive_webhook", skip(state, request))]
pub async fn receive_webhook(State(state): State<AppState>, request: Request) -> Response {
    let Some(RawBody(body)) = request.extensions().get::<RawBody>().cloned() else {
        error!(code = "E3001", "verified body missing from request extensions");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &PayhookError::internal("request body unavailable"),
        );
    };

    let payload = match InboundPayload::classify(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(code = e.code(), error = %e, "rejecting malformed webhook body");
            return error_response(StatusCode::BAD_REQUEST, &e);
        },
    };

    match payload {
        InboundPayload::Verification { verification_token, webhook_subscription_uuid } => {
            let subscription = webhook_subscription_uuid.as_deref().unwrap_or("unknown");
            info!(
                verification_token = %verification_token,
                webhook_subscription_uuid = subscription,
                "received subscription verification payload; submit the token to complete verification"
            );
            (StatusCode::OK, VERIFICATION_ACK).into_response()
        },
        InboundPayload::Event => match state.queue.enqueue(Job::new(body)) {
            Ok(()) => {
                let queue_depth = state.queue.len();
                info!(queue_depth, "webhook event queued for processing");
                (StatusCode::ACCEPTED, Json(AcceptedResponse { status: "accepted", queue_depth }))
                    .into_response()
            },
            Err(e) => {
                let error = e.to_payhook_error();
                error!(code = error.code(), error = %e, "rejecting webhook event");
                error_response(StatusCode::SERVICE_UNAVAILABLE, &error)
            },
        },
        InboundPayload::Unrecognized => {
            warn!(body_len = body.len(), "received webhook with unknown payload format");
            error_response(
                StatusCode::BAD_REQUEST,
                &PayhookError::malformed("unknown request format"),
            )
        },
    }
}

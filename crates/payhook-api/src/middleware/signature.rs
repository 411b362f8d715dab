//! Webhook signature verification middleware.
//!
//! Buffers the request body once, verifies its HMAC against the
//! `X-Gusto-Signature` header, and rebuilds the request so downstream
//! handlers see the exact bytes that were signed.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use payhook_core::PayhookError;
use tracing::{debug, error, warn};

use crate::{
    crypto::{Verified, SIGNATURE_HEADER},
    handlers::error_response,
    AppState,
};

/// Verified request body, stored in request extensions.
#[derive(Debug, Clone)]
pub struct RawBody(pub Bytes);

fn extract_signature(headers: &HeaderMap) -> Option<&str> {
    headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok())
}

#[derive(Debug)]
enum BodyError {
    TooLarge,
    Unreadable(axum::Error),
}

/// Collects the body, failing as soon as it grows past `limit` bytes.
async fn buffer_body(body: Body, limit: usize) -> Result<Bytes, BodyError> {
    let mut stream = body.into_data_stream();
    let mut buffer = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(BodyError::Unreadable)?;
        if buffer.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge);
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer.freeze())
}

/// Axum middleware that rejects requests whose body signature does not
/// verify.
pub async fn verify_signature(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();

    let bytes = match buffer_body(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(BodyError::TooLarge) => {
            warn!(limit = state.max_body_bytes, "rejecting oversized webhook body");
            let reason = format!("body larger than {} bytes", state.max_body_bytes);
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, &PayhookError::malformed(reason));
        },
        Err(BodyError::Unreadable(e)) => {
            error!(error = %e, code = "E3001", "failed to read webhook body");
            let error = PayhookError::internal(format!("request body could not be read: {e}"));
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &error);
        },
    };

    match state.verifier.verify(&bytes, extract_signature(&parts.headers)) {
        Ok(Verified::Authentic) => debug!(body_len = bytes.len(), "webhook signature verified"),
        Ok(Verified::SetupMode) => {},
        Err(e) => {
            warn!(error = %e, code = "E1002", "rejecting webhook with bad signature");
            let error = PayhookError::unauthenticated(e.to_string());
            return error_response(StatusCode::FORBIDDEN, &error);
        },
    }

    let mut req = Request::from_parts(parts, Body::from(bytes.clone()));
    req.extensions_mut().insert(RawBody(bytes));

    next.run(req).await
}

//! Domain models for inbound payroll notifications.
//!
//! Covers the parsed event envelope, the queue-resident job wrapper, and the
//! classification of raw inbound bodies into event and handshake payloads.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::PayhookError;

/// Upstream-assigned event identifier.
///
/// Identifiers are opaque strings chosen by the sending platform, so no UUID
/// format is enforced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    /// Creates an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A parsed notification from the payroll platform.
///
/// Immutable once parsed. Only `uuid` and `event_type` are required; the
/// resource reference and payload default when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Globally unique event identifier, used as the idempotency key.
    pub uuid: EventId,
    /// Event discriminator, e.g. `company.updated`.
    pub event_type: String,
    /// Type of the resource the event refers to, e.g. `Company`.
    #[serde(default)]
    pub resource_type: String,
    /// Identifier of the resource the event refers to.
    #[serde(default)]
    pub resource_uuid: String,
    /// Type of the entity that changed, when it differs from the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// Identifier of the entity that changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_uuid: Option<String>,
    /// Opaque, type-dependent payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Unit of work moving through the admission queue.
///
/// Carries the raw payload exactly as received so parsing happens on the
/// worker, plus the number of attempts already made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Raw, not-yet-parsed request body.
    pub payload: Bytes,
    /// Attempts already made; zero for a freshly accepted job.
    pub attempts: u32,
}

impl Job {
    /// Creates a job for a freshly accepted payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self { payload: payload.into(), attempts: 0 }
    }

    /// Deserializes the payload into a webhook event.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error if the payload is not a valid event
    /// envelope.
    pub fn parse(&self) -> Result<WebhookEvent, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// Whether this job has been through at least one failed attempt.
    pub fn is_retry(&self) -> bool {
        self.attempts > 0
    }

    /// Returns the same payload with the attempt counter advanced by one.
    #[must_use]
    pub fn next_attempt(self) -> Self {
        Self { payload: self.payload, attempts: self.attempts.saturating_add(1) }
    }
}

/// Classification of a raw inbound webhook body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPayload {
    /// One-time subscription handshake carrying the verification token.
    Verification {
        /// Token to submit back to the platform to verify the subscription.
        verification_token: String,
        /// Subscription the token belongs to.
        webhook_subscription_uuid: Option<String>,
    },
    /// Event notification to be queued for processing.
    Event,
    /// Valid JSON object that is neither a handshake nor an event.
    Unrecognized,
}

impl InboundPayload {
    /// Classifies a raw body by the presence of `verification_token` or
    /// `event_type`.
    ///
    /// # Errors
    ///
    /// Returns `PayhookError::MalformedRequest` if the body is not a JSON
    /// object.
    pub fn classify(body: &[u8]) -> Result<Self, PayhookError> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| PayhookError::malformed(format!("invalid JSON: {e}")))?;

        let Some(object) = value.as_object() else {
            return Err(PayhookError::malformed("expected a JSON object"));
        };

        if let Some(token) = object.get("verification_token") {
            return Ok(Self::Verification {
                verification_token: token
                    .as_str()
                    .map_or_else(|| token.to_string(), ToString::to_string),
                webhook_subscription_uuid: object
                    .get("webhook_subscription_uuid")
                    .and_then(serde_json::Value::as_str)
                    .map(ToString::to_string),
            });
        }

        if object.contains_key("event_type") {
            return Ok(Self::Event);
        }

        Ok(Self::Unrecognized)
    }
}

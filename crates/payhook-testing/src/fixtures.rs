//! Payload builders and signing helpers.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Shared secret used by signed-request tests.
pub const TEST_SECRET: &str = "test-verification-token";

/// Builder for event envelopes as the payroll platform sends them.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    uuid: String,
    event_type: String,
    resource_type: String,
    resource_uuid: String,
    payload: Value,
}

impl EventBuilder {
    /// Creates a `company.created` event with the given identifier.
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            event_type: "company.created".to_string(),
            resource_type: "Company".to_string(),
            resource_uuid: "company-uuid-1".to_string(),
            payload: json!({}),
        }
    }

    /// Sets the event type.
    #[must_use]
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    /// Sets the referenced resource.
    #[must_use]
    pub fn resource(mut self, resource_type: impl Into<String>, uuid: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self.resource_uuid = uuid.into();
        self
    }

    /// Sets the opaque payload.
    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Builds the JSON value.
    pub fn to_json(&self) -> Value {
        json!({
            "uuid": self.uuid,
            "event_type": self.event_type,
            "resource_type": self.resource_type,
            "resource_uuid": self.resource_uuid,
            "entity_type": self.resource_type,
            "entity_uuid": self.resource_uuid,
            "timestamp": 1_700_000_000,
            "payload": self.payload,
        })
    }

    /// Builds the serialized body.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_json().to_string())
    }
}

/// Serialized event envelope with the given identifier and type.
pub fn event_body(uuid: &str, event_type: &str) -> Bytes {
    EventBuilder::new(uuid).event_type(event_type).to_bytes()
}

/// Serialized subscription verification handshake.
pub fn verification_body(token: &str, subscription_uuid: &str) -> Bytes {
    Bytes::from(
        json!({
            "verification_token": token,
            "webhook_subscription_uuid": subscription_uuid,
        })
        .to_string(),
    )
}

/// Hex-encoded HMAC-SHA256 of `body` under `secret`.
pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

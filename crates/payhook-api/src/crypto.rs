//! HMAC-SHA256 signature verification for inbound webhooks.
//!
//! The platform signs the exact request body with the shared verification
//! token and sends the lowercase hex digest in the `X-Gusto-Signature`
//! header. Until a token is configured the service runs in setup mode and
//! accepts unsigned payloads so the one-time verification handshake can
//! complete.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Gusto-Signature";

/// Signature verification errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Missing signature header.
    #[error("signature header missing")]
    MissingSignature,
    /// Signature is not a hex digest.
    #[error("invalid signature format: {0}")]
    InvalidFormat(String),
    /// Digest does not match the body.
    #[error("signature verification failed")]
    VerificationFailed,
    /// Secret cannot key the MAC.
    #[error("invalid secret key")]
    InvalidSecret,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verified {
    /// Signature matched the configured secret.
    Authentic,
    /// No secret configured; the payload was not checked.
    SetupMode,
}

/// Verifies body signatures against a shared secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Option<String>,
}

impl SignatureVerifier {
    /// Creates a verifier. `None` or an empty secret enables setup mode.
    pub fn new(secret: Option<String>) -> Self {
        Self { secret: secret.filter(|s| !s.is_empty()) }
    }

    /// Whether verification is bypassed.
    pub fn is_setup_mode(&self) -> bool {
        self.secret.is_none()
    }

    /// Verifies `signature` against the HMAC-SHA256 of `body`.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError` when a secret is configured and the signature
    /// is missing, malformed, or does not match.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<Verified, SignatureError> {
        let Some(secret) = self.secret.as_deref() else {
            warn!("signing secret not configured, accepting unsigned payload (setup mode)");
            return Ok(Verified::SetupMode);
        };

        let signature = signature.map(str::trim).filter(|s| !s.is_empty());
        let Some(signature) = signature else {
            return Err(SignatureError::MissingSignature);
        };

        let digest = decode_signature(signature)?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::InvalidSecret)?;
        mac.update(body);
        mac.verify_slice(&digest).map_err(|_| SignatureError::VerificationFailed)?;

        Ok(Verified::Authentic)
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").field("setup_mode", &self.is_setup_mode()).finish()
    }
}

/// Generates HMAC-SHA256 signature as hex string.
///
/// # Errors
///
/// Returns `SignatureError::InvalidSecret` if the secret key is invalid.
pub fn generate_hmac_hex(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;

    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Decodes a raw or `sha256=`-prefixed hex digest.
fn decode_signature(signature: &str) -> Result<Vec<u8>, SignatureError> {
    let hex_digest = signature.strip_prefix("sha256=").unwrap_or(signature);

    hex::decode(hex_digest)
        .map_err(|e| SignatureError::InvalidFormat(format!("expected hex digest: {e}")))
}

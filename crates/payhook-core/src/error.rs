//! Error taxonomy for the webhook pipeline.
//!
//! Every failure the pipeline can report carries a stable code so boundary
//! responses and asynchronous worker logs can be correlated. Boundary errors
//! (E1xxx) are returned synchronously to the sender; worker errors (E2xxx)
//! only ever surface through logs.

use thiserror::Error;

use crate::models::EventId;

/// Result type alias using `PayhookError`.
pub type Result<T> = std::result::Result<T, PayhookError>;

/// Payhook error types with stable codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayhookError {
    // Boundary errors (E1001-E1004)
    /// Request body is not valid JSON or has an unrecognized shape (E1001).
    #[error("[E1001] Malformed request: {reason}")]
    MalformedRequest {
        /// What was wrong with the body
        reason: String,
    },

    /// Signature missing or does not match the body (E1002).
    #[error("[E1002] Unauthenticated: {reason}")]
    Unauthenticated {
        /// Why verification rejected the request
        reason: String,
    },

    /// Admission queue is full (E1003).
    #[error("[E1003] Capacity exceeded: admission queue at capacity {capacity}")]
    CapacityExceeded {
        /// Configured queue capacity
        capacity: usize,
    },

    /// Admission queue no longer accepts work (E1004).
    #[error("[E1004] Queue closed: service is shutting down")]
    QueueClosed,

    // Worker errors (E2001-E2005)
    /// Job payload could not be parsed into an event (E2001).
    #[error("[E2001] Unparseable payload: {reason}")]
    Unparseable {
        /// Deserialization error
        reason: String,
    },

    /// Processing failed with a recoverable error (E2002).
    #[error("[E2002] Transient processing failure for {event_id} on attempt {attempt}: {reason}")]
    TransientProcessing {
        /// Event being processed
        event_id: EventId,
        /// Attempt that failed (1-based)
        attempt: u32,
        /// Failure description
        reason: String,
    },

    /// Processing failed and retrying will not help (E2003).
    #[error("[E2003] Permanent processing failure for {event_id}: {reason}")]
    PermanentProcessing {
        /// Event being processed
        event_id: EventId,
        /// Failure description
        reason: String,
    },

    /// Processing failed in a way that could not be classified (E2004).
    #[error("[E2004] Unknown processing failure for {event_id}: {reason}")]
    UnknownFailure {
        /// Event being processed
        event_id: EventId,
        /// Failure description
        reason: String,
    },

    /// Retry budget exhausted; needs manual intervention (E2005).
    #[error("[E2005] Dead-lettered {event_id} after {attempts} attempts: {reason}")]
    DeadLettered {
        /// Event that exhausted its retries
        event_id: EventId,
        /// Total attempts made
        attempts: u32,
        /// Last failure description
        reason: String,
    },

    // System errors (E3001)
    /// Internal wiring failure (E3001).
    #[error("[E3001] Internal error: {reason}")]
    Internal {
        /// Failure description
        reason: String,
    },
}

impl PayhookError {
    /// Creates a malformed request error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRequest { reason: reason.into() }
    }

    /// Creates an authentication error.
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated { reason: reason.into() }
    }

    /// Creates an internal error.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal { reason: reason.into() }
    }

    /// Returns the stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedRequest { .. } => "E1001",
            Self::Unauthenticated { .. } => "E1002",
            Self::CapacityExceeded { .. } => "E1003",
            Self::QueueClosed => "E1004",
            Self::Unparseable { .. } => "E2001",
            Self::TransientProcessing { .. } => "E2002",
            Self::PermanentProcessing { .. } => "E2003",
            Self::UnknownFailure { .. } => "E2004",
            Self::DeadLettered { .. } => "E2005",
            Self::Internal { .. } => "E3001",
        }
    }

    /// Whether the sender (or this system) may usefully try again.
    ///
    /// Capacity rejections rely on the sender's own redelivery, unknown
    /// failures are left uncommitted so a redelivery is processed afresh.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. }
                | Self::QueueClosed
                | Self::TransientProcessing { .. }
                | Self::UnknownFailure { .. }
                | Self::Internal { .. }
        )
    }
}

//! Error types for event processing and worker lifecycle.
//!
//! `ProcessingError` describes why a single processing call failed and is
//! what the failure classifier inspects. `WorkerError` covers the pool's own
//! lifecycle. `QueueError` is the admission queue's rejection signal.

use std::time::Duration;

use payhook_core::Job;
use thiserror::Error;

/// Result type alias for worker lifecycle operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Why a processing call against the remote API failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingError {
    /// No response was obtained from the remote API.
    #[error("network request failed: {message}")]
    Network {
        /// Transport error description
        message: String,
    },

    /// Remote API did not respond in time.
    #[error("request timed out after {timeout_seconds}s")]
    Timeout {
        /// Configured request timeout
        timeout_seconds: u64,
    },

    /// Remote API returned a structured error body.
    #[error("remote API error (HTTP {status_code}, {category}): {message}")]
    Api {
        /// HTTP status code
        status_code: u16,
        /// Machine-readable error category from the first error entry
        category: String,
        /// Human-readable error message
        message: String,
    },

    /// Remote API returned an error whose body could not be understood.
    #[error("unrecognized error response (HTTP {status_code}): {body}")]
    UnrecognizedResponse {
        /// HTTP status code
        status_code: u16,
        /// Raw response body, truncated
        body: String,
    },
}

impl ProcessingError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a structured API error.
    pub fn api(status_code: u16, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api { status_code, category: category.into(), message: message.into() }
    }

    /// Creates an unrecognized response error.
    pub fn unrecognized(status_code: u16, body: impl Into<String>) -> Self {
        Self::UnrecognizedResponse { status_code, body: body.into() }
    }
}

/// Rejection from the admission queue; hands the job back to the caller.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Queue is at capacity.
    #[error("admission queue is full (capacity {capacity})")]
    CapacityExceeded {
        /// The rejected job
        job: Job,
        /// Configured capacity
        capacity: usize,
    },

    /// Queue has been closed.
    #[error("admission queue is closed")]
    Closed {
        /// The rejected job
        job: Job,
    },
}

impl QueueError {
    /// Returns the rejected job.
    pub fn into_job(self) -> Job {
        match self {
            Self::CapacityExceeded { job, .. } | Self::Closed { job } => job,
        }
    }

    /// Converts into the shared error taxonomy.
    pub fn to_payhook_error(&self) -> payhook_core::PayhookError {
        match self {
            Self::CapacityExceeded { capacity, .. } => {
                payhook_core::PayhookError::CapacityExceeded { capacity: *capacity }
            },
            Self::Closed { .. } => payhook_core::PayhookError::QueueClosed,
        }
    }
}

/// Worker pool lifecycle errors.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    /// Invalid pool or engine configuration.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// What is wrong
        message: String,
    },

    /// Engine was started twice.
    #[error("processing engine already started")]
    AlreadyStarted,

    /// A worker task panicked.
    #[error("worker {worker_id} panicked: {error}")]
    WorkerPanic {
        /// Worker that panicked
        worker_id: usize,
        /// Join error description
        error: String,
    },

    /// Workers did not finish within the shutdown timeout.
    #[error("shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// Timeout that was exceeded
        timeout: Duration,
    },
}

impl WorkerError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}

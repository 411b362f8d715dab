//! Failure classification and the tagged processing outcome.
//!
//! Processors report an explicit [`ProcessingOutcome`]; when they fail with a
//! [`ProcessingError`] the [`FailureClassifier`] decides which of the three
//! failure routes the job takes.

use std::fmt;

use crate::error::ProcessingError;

/// Remote API error categories that indicate a recoverable server condition.
pub const TRANSIENT_CATEGORIES: &[&str] = &["server_error", "rate_limit_error", "system_error"];

/// Failure route for a processing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Likely to succeed on retry.
    Transient,
    /// Will not succeed on retry.
    Permanent,
    /// Error shape not recognized.
    Unknown,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of a single processing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Processing completed.
    Success,
    /// Processing failed and must not be retried.
    Permanent(String),
    /// Processing failed and may succeed later.
    Transient(String),
    /// Processing failed in an unclassifiable way.
    Unknown(String),
}

impl ProcessingOutcome {
    /// Builds an outcome from a processing result using the default
    /// classifier.
    pub fn from_result(result: std::result::Result<(), ProcessingError>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(error) => FailureClassifier.outcome_for(&error),
        }
    }

    /// Whether the attempt succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Failure class, or `None` on success.
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            Self::Success => None,
            Self::Permanent(_) => Some(FailureClass::Permanent),
            Self::Transient(_) => Some(FailureClass::Transient),
            Self::Unknown(_) => Some(FailureClass::Unknown),
        }
    }
}

/// Maps processing errors to failure classes.
///
/// Transport failures are transient. Structured API errors are classified by
/// their `category`. Anything else is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureClassifier;

impl FailureClassifier {
    /// Classifies a processing error.
    pub fn classify(&self, error: &ProcessingError) -> FailureClass {
        match error {
            ProcessingError::Network { .. } | ProcessingError::Timeout { .. } => {
                FailureClass::Transient
            },
            ProcessingError::Api { category, .. } => Self::classify_category(category),
            ProcessingError::UnrecognizedResponse { .. } => FailureClass::Unknown,
        }
    }

    /// Classifies a remote API error category.
    pub fn classify_category(category: &str) -> FailureClass {
        if TRANSIENT_CATEGORIES.contains(&category) {
            FailureClass::Transient
        } else {
            FailureClass::Permanent
        }
    }

    /// Converts a processing error into the matching failure outcome.
    pub fn outcome_for(&self, error: &ProcessingError) -> ProcessingOutcome {
        let reason = error.to_string();
        match self.classify(error) {
            FailureClass::Transient => ProcessingOutcome::Transient(reason),
            FailureClass::Permanent => ProcessingOutcome::Permanent(reason),
            FailureClass::Unknown => ProcessingOutcome::Unknown(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_transient() {
        let classifier = FailureClassifier;
        assert_eq!(
            classifier.classify(&ProcessingError::network("connection refused")),
            FailureClass::Transient
        );
        assert_eq!(classifier.classify(&ProcessingError::timeout(15)), FailureClass::Transient);
    }

    #[test]
    fn server_side_categories_are_transient() {
        for category in TRANSIENT_CATEGORIES {
            let error = ProcessingError::api(503, *category, "try later");
            assert_eq!(FailureClassifier.classify(&error), FailureClass::Transient, "{category}");
        }
    }

    #[test]
    fn other_categories_are_permanent() {
        for category in ["invalid_request_error", "not_found_error", "auth_error", ""] {
            let error = ProcessingError::api(400, category, "nope");
            assert_eq!(FailureClassifier.classify(&error), FailureClass::Permanent, "{category}");
        }
    }

    #[test]
    fn classification_ignores_status_code() {
        let error = ProcessingError::api(404, "rate_limit_error", "slow down");
        assert_eq!(FailureClassifier.classify(&error), FailureClass::Transient);
    }

    #[test]
    fn unrecognized_bodies_are_unknown() {
        let error = ProcessingError::unrecognized(502, "<html>bad gateway</html>");
        assert_eq!(FailureClassifier.classify(&error), FailureClass::Unknown);
    }

    #[test]
    fn outcome_carries_reason() {
        let outcome = ProcessingOutcome::from_result(Err(ProcessingError::api(
            422,
            "invalid_request_error",
            "bad field",
        )));

        match outcome {
            ProcessingOutcome::Permanent(reason) => assert!(reason.contains("bad field")),
            other => panic!("expected permanent outcome, got {other:?}"),
        }
        assert!(ProcessingOutcome::from_result(Ok(())).is_success());
        assert_eq!(ProcessingOutcome::Success.failure_class(), None);
    }
}

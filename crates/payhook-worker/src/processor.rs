//! Event processing against the payroll platform API.
//!
//! [`EventProcessor`] is the seam between the worker and the outside world:
//! workers only see the tagged [`ProcessingOutcome`] it returns.
//! [`ApiProcessor`] is the production implementation, which refreshes the
//! referenced resource from the remote API for the event types it cares
//! about and acknowledges everything else.

use std::time::Duration;

use payhook_core::WebhookEvent;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, Instrument};

use crate::{
    classifier::{FailureClassifier, ProcessingOutcome},
    error::{ProcessingError, WorkerError},
};

/// Longest error body excerpt kept in an unrecognized-response error.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Processing operation invoked once per attempt.
#[async_trait::async_trait]
pub trait EventProcessor: Send + Sync + std::fmt::Debug {
    /// Processes a parsed event and reports the outcome.
    async fn process(&self, event: &WebhookEvent) -> ProcessingOutcome;
}

/// Configuration for the remote API processor.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiClientConfig {
    /// Base URL of the remote API, without trailing slash.
    pub base_url: String,
    /// Bearer token for API calls.
    pub access_token: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// User agent string.
    pub user_agent: String,
    /// Event types that trigger a resource fetch.
    pub fetch_event_types: Vec<String>,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: crate::DEFAULT_API_BASE_URL.to_string(),
            access_token: String::new(),
            timeout: Duration::from_secs(crate::DEFAULT_API_TIMEOUT_SECONDS),
            user_agent: format!("payhook/{}", env!("CARGO_PKG_VERSION")),
            fetch_event_types: vec!["company.updated".to_string()],
        }
    }
}

impl std::fmt::Debug for ApiClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClientConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("fetch_event_types", &self.fetch_event_types)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEntry {
    #[serde(default)]
    category: String,
    #[serde(default)]
    message: String,
}

/// Processor that refreshes the event's resource from the remote API.
#[derive(Debug, Clone)]
pub struct ApiProcessor {
    client: reqwest::Client,
    config: ApiClientConfig,
    classifier: FailureClassifier,
}

impl ApiProcessor {
    /// Creates a processor with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(config: ApiClientConfig) -> Result<Self, WorkerError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| WorkerError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config, classifier: FailureClassifier })
    }

    /// Whether `event_type` triggers a resource fetch.
    pub fn should_fetch(&self, event_type: &str) -> bool {
        self.config.fetch_event_types.iter().any(|trigger| event_type.contains(trigger.as_str()))
    }

    /// URL of the resource an event refers to.
    pub fn resource_url(&self, event: &WebhookEvent) -> String {
        let resource_type =
            if event.resource_type.is_empty() { "Company" } else { event.resource_type.as_str() };
        format!(
            "{}/v1/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            collection_name(resource_type),
            event.resource_uuid
        )
    }

    /// Fetches the resource an event refers to.
    ///
    /// # Errors
    ///
    /// Returns `Network` or `Timeout` if no response was obtained, `Api` for a
    /// structured error body, and `UnrecognizedResponse` for any other error
    /// response.
    pub async fn fetch_resource(&self, event: &WebhookEvent) -> Result<(), ProcessingError> {
        let url = self.resource_url(event);
        let span = info_span!("resource_fetch", event_id = %event.uuid, url = %url);

        async move {
            debug!("fetching resource");

            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.config.access_token)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await
                .map_err(|e| self.map_transport_error(&e))?;

            let status = response.status();
            if status.is_success() {
                debug!(status = status.as_u16(), "resource fetched");
                return Ok(());
            }

            let body = response.text().await.map_err(|e| self.map_transport_error(&e))?;
            Err(parse_error_body(status.as_u16(), &body))
        }
        .instrument(span)
        .await
    }

    fn map_transport_error(&self, error: &reqwest::Error) -> ProcessingError {
        if error.is_timeout() {
            ProcessingError::timeout(self.config.timeout.as_secs())
        } else {
            ProcessingError::network(error.to_string())
        }
    }
}

#[async_trait::async_trait]
impl EventProcessor for ApiProcessor {
    async fn process(&self, event: &WebhookEvent) -> ProcessingOutcome {
        if !self.should_fetch(&event.event_type) {
            debug!(event_id = %event.uuid, event_type = %event.event_type, "no remote work for event type");
            return ProcessingOutcome::Success;
        }

        match self.fetch_resource(event).await {
            Ok(()) => ProcessingOutcome::Success,
            Err(error) => self.classifier.outcome_for(&error),
        }
    }
}

/// Maps a resource type to its REST collection, e.g. `Company` → `companies`.
fn collection_name(resource_type: &str) -> String {
    let lower = resource_type.to_ascii_lowercase();
    match lower.strip_suffix('y') {
        Some(stem) if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) => format!("{stem}ies"),
        _ => format!("{lower}s"),
    }
}

fn parse_error_body(status_code: u16, body: &str) -> ProcessingError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => match parsed.errors.into_iter().next() {
            Some(entry) => ProcessingError::api(status_code, entry.category, entry.message),
            None => ProcessingError::unrecognized(status_code, truncate(body)),
        },
        Err(_) => ProcessingError::unrecognized(status_code, truncate(body)),
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

//! Configuration management for the payhook service.

use std::{fmt, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use payhook_worker::{ApiClientConfig, BackoffStrategy, EngineConfig, RetryPolicy};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.toml";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Environment variable names are the upper-cased field names. The platform's
/// conventional names `GUSTO_VERIFICATION_TOKEN`, `GUSTO_API_TOKEN` and
/// `SERVER_PORT` are accepted as well.
///
/// # Example
///
/// ```no_run
/// use payhook_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
/// println!("Listening on {}:{}", config.host, config.port);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT` or `SERVER_PORT`
    #[serde(default = "default_port")]
    pub port: u16,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Largest accepted webhook body in bytes.
    ///
    /// Environment variable: `MAX_BODY_BYTES`
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    // Pipeline
    /// Admission queue capacity.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Number of concurrent processing workers.
    ///
    /// Environment variable: `WORKER_COUNT`
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Seconds to wait for workers to drain on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECONDS`
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,

    // Retry
    /// Total processing attempts per event.
    ///
    /// Environment variable: `MAX_RETRY_ATTEMPTS`
    #[serde(default = "default_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Delay between retries in milliseconds.
    ///
    /// Environment variable: `RETRY_DELAY_MS`
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Cap on exponential retry delays in milliseconds.
    ///
    /// Environment variable: `RETRY_MAX_DELAY_MS`
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Retry delay growth: `fixed` or `exponential`.
    ///
    /// Environment variable: `RETRY_BACKOFF`
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: BackoffStrategy,
    /// Jitter factor for retry delays (0.0 to 1.0).
    ///
    /// Environment variable: `RETRY_JITTER_FACTOR`
    #[serde(default)]
    pub retry_jitter_factor: f64,

    // Platform
    /// Shared secret for webhook signatures. Empty enables setup mode.
    ///
    /// Environment variable: `SIGNING_SECRET` or `GUSTO_VERIFICATION_TOKEN`
    #[serde(default)]
    pub signing_secret: String,
    /// Bearer token for the platform API.
    ///
    /// Environment variable: `API_TOKEN` or `GUSTO_API_TOKEN`
    #[serde(default)]
    pub api_token: String,
    /// Platform API base URL.
    ///
    /// Environment variable: `API_BASE_URL`
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Platform API request timeout in seconds.
    ///
    /// Environment variable: `API_TIMEOUT_SECONDS`
    #[serde(default = "default_api_timeout")]
    pub api_timeout_seconds: u64,
    /// Event types that trigger a resource refresh.
    ///
    /// Environment variable: `FETCH_EVENT_TYPES`
    #[serde(default = "default_fetch_event_types")]
    pub fetch_event_types: Vec<String>,

    // Logging
    /// Log filter directives.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
    /// Log output format.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(env_provider());

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to the processing engine configuration.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            worker_count: self.worker_count,
            queue_capacity: self.queue_capacity,
            retry_policy: self.to_retry_policy(),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_seconds),
        }
    }

    /// Convert to retry policy.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        let base_delay = Duration::from_millis(self.retry_delay_ms);
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            base_delay,
            max_delay: Duration::from_millis(self.retry_max_delay_ms).max(base_delay),
            jitter_factor: self.retry_jitter_factor,
            backoff_strategy: self.retry_backoff,
        }
    }

    /// Convert to the platform API client configuration.
    pub fn to_api_client_config(&self) -> ApiClientConfig {
        ApiClientConfig {
            base_url: self.api_base_url.clone(),
            access_token: self.api_token.clone(),
            timeout: Duration::from_secs(self.api_timeout_seconds),
            fetch_event_types: self.fetch_event_types.clone(),
            ..ApiClientConfig::default()
        }
    }

    /// Parse server socket address from host and port configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Signing secret, or `None` in setup mode.
    pub fn signing_secret(&self) -> Option<&str> {
        Some(self.signing_secret.as_str()).filter(|secret| !secret.is_empty())
    }

    /// Non-fatal configuration problems worth logging at startup.
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if self.signing_secret.is_empty() {
            warnings.push(
                "signing secret not set: webhook signatures are not verified (setup mode)",
            );
        }
        if self.api_token.is_empty() {
            warnings.push("API token not set: platform API calls will be rejected");
        }
        warnings
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        if self.worker_count == 0 {
            anyhow::bail!("worker_count must be greater than 0");
        }

        if self.max_retry_attempts == 0 {
            anyhow::bail!("max_retry_attempts must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            anyhow::bail!("retry_jitter_factor must be between 0.0 and 1.0");
        }

        if self.max_body_bytes == 0 {
            anyhow::bail!("max_body_bytes must be greater than 0");
        }

        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            anyhow::bail!("api_base_url must be an http(s) URL");
        }

        Ok(())
    }
}

/// Environment provider that also understands the platform's variable names.
fn env_provider() -> Env {
    Env::raw().map(|key| {
        let key = key.as_str().to_ascii_lowercase();
        match key.as_str() {
            "gusto_verification_token" => "signing_secret".into(),
            "gusto_api_token" => "api_token".into(),
            "server_port" => "port".into(),
            _ => key.into(),
        }
    })
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("queue_capacity", &self.queue_capacity)
            .field("worker_count", &self.worker_count)
            .field("max_retry_attempts", &self.max_retry_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("retry_backoff", &self.retry_backoff)
            .field("signing_secret", &mask(&self.signing_secret))
            .field("api_token", &mask(&self.api_token))
            .field("api_base_url", &self.api_base_url)
            .field("log_format", &self.log_format)
            .finish_non_exhaustive()
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "***"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
            queue_capacity: default_queue_capacity(),
            worker_count: default_worker_count(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            max_retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_backoff: default_retry_backoff(),
            retry_jitter_factor: 0.0,
            signing_secret: String::new(),
            api_token: String::new(),
            api_base_url: default_api_base_url(),
            api_timeout_seconds: default_api_timeout(),
            fetch_event_types: default_fetch_event_types(),
            rust_log: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_queue_capacity() -> usize {
    payhook_worker::DEFAULT_QUEUE_CAPACITY
}

fn default_worker_count() -> usize {
    payhook_worker::DEFAULT_WORKER_COUNT
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    payhook_worker::DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    10_000
}

fn default_retry_max_delay_ms() -> u64 {
    600_000
}

fn default_retry_backoff() -> BackoffStrategy {
    BackoffStrategy::Fixed
}

fn default_api_base_url() -> String {
    payhook_worker::DEFAULT_API_BASE_URL.to_string()
}

fn default_api_timeout() -> u64 {
    payhook_worker::DEFAULT_API_TIMEOUT_SECONDS
}

fn default_fetch_event_types() -> Vec<String> {
    vec!["company.updated".to_string()]
}

fn default_log_level() -> String {
    "info,payhook=debug,tower_http=debug".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

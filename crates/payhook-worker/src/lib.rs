//! Asynchronous processing pipeline for signed payroll webhooks.
//!
//! Accepted events are buffered in a bounded [`AdmissionQueue`] and drained
//! by a fixed pool of workers. Each worker runs the same pipeline:
//!
//! 1. **Parse** - deserialize the raw payload; unparseable jobs are dropped
//! 2. **Claim** - atomically claim the event identifier; duplicates are dropped
//! 3. **Process** - call the [`EventProcessor`] for a tagged outcome
//! 4. **Route** - commit, schedule a retry, dead-letter, or release the claim
//!
//! Retries are delayed by the [`RetryScheduler`], whose timers are owned by
//! the engine and cancelled on shutdown before the queue closes.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use payhook_worker::{ApiClientConfig, ApiProcessor, EngineConfig, ProcessingEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let processor = Arc::new(ApiProcessor::new(ApiClientConfig::default())?);
//! let mut engine = ProcessingEngine::new(EngineConfig::default(), processor)?;
//! engine.start().await?;
//!
//! let queue = engine.queue();
//! queue.enqueue(payhook_core::Job::new(r#"{"uuid":"1","event_type":"company.created"}"#))?;
//!
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

pub mod classifier;
pub mod engine;
pub mod error;
pub mod idempotency;
pub mod processor;
pub mod queue;
pub mod retry;
mod worker;
mod worker_pool;

pub use classifier::{FailureClass, FailureClassifier, ProcessingOutcome};
pub use engine::ProcessingEngine;
pub use error::{ProcessingError, QueueError, Result, WorkerError};
pub use idempotency::{Claim, IdempotencyStore};
pub use processor::{ApiClientConfig, ApiProcessor, EventProcessor};
pub use queue::AdmissionQueue;
pub use retry::{BackoffStrategy, RetryDecision, RetryPolicy, RetryScheduler};
pub use worker::{EngineConfig, EngineStats};
pub use worker_pool::WorkerPool;

/// Default number of concurrent workers.
pub const DEFAULT_WORKER_COUNT: usize = 5;

/// Default admission queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default total processing attempts per event.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay between retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Default remote API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.gusto-demo.com";

/// Default remote API request timeout in seconds.
pub const DEFAULT_API_TIMEOUT_SECONDS: u64 = 15;

//! Retry policy and managed retry timers.
//!
//! A transient failure is retried after a delay by a tracked task that
//! re-enqueues the job on the admission queue. Timers are owned by the
//! [`RetryScheduler`], so shutdown can cancel them before the queue closes
//! instead of leaving detached tasks to push into a closed queue.

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use payhook_core::{Clock, EventHandler, EventId, Job, ProcessingEvent};

use crate::{idempotency::IdempotencyStore, queue::AdmissionQueue};

/// Retry policy for transient processing failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total processing attempts allowed, including the first.
    pub max_attempts: u32,

    /// Delay before each retry (the first step for exponential backoff).
    pub base_delay: Duration,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Randomization applied to each delay (0.0 to 1.0).
    pub jitter_factor: f64,

    /// How delays grow between attempts.
    pub backoff_strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            base_delay: crate::DEFAULT_RETRY_DELAY,
            max_delay: Duration::from_secs(600),
            jitter_factor: 0.0,
            backoff_strategy: BackoffStrategy::Fixed,
        }
    }
}

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles with each attempt.
    Exponential,
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Exponential => write!(f, "exponential"),
        }
    }
}

impl FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            other => Err(format!("unknown backoff strategy '{other}'")),
        }
    }
}

/// What to do after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay.
    Retry {
        /// Delay before re-enqueue
        delay: Duration,
    },
    /// Budget exhausted; dead-letter the job.
    GiveUp {
        /// Attempts made
        attempts: u32,
    },
}

impl RetryPolicy {
    /// Creates a fixed-delay policy.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, base_delay: delay, max_delay: delay, ..Self::default() }
    }

    /// Decides the next step after `attempts_made` attempts have failed
    /// transiently.
    pub fn decide(&self, attempts_made: u32) -> RetryDecision {
        if attempts_made >= self.max_attempts {
            RetryDecision::GiveUp { attempts: attempts_made }
        } else {
            RetryDecision::Retry { delay: self.delay_for(attempts_made) }
        }
    }

    /// Delay before the retry that follows `attempts_made` failed attempts.
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let delay = match self.backoff_strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let exponent = attempts_made.saturating_sub(1).min(20);
                self.base_delay.saturating_mul(2_u32.saturating_pow(exponent))
            },
        };

        let capped = delay.min(self.max_delay.max(self.base_delay));
        apply_jitter(capped, self.jitter_factor)
    }
}

/// Randomizes a duration by ±`jitter_factor`.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let range = duration.as_secs_f64() * jitter_factor.clamp(0.0, 1.0);
    let offset = rand::rng().random_range(-range..=range);

    Duration::from_secs_f64((duration.as_secs_f64() + offset).max(0.0))
}

/// Owns the delayed re-enqueue tasks for transiently failed jobs.
///
/// Clones share the same tracker, so every worker schedules into one set of
/// timers that [`shutdown`](Self::shutdown) can cancel and await.
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    queue: Arc<AdmissionQueue>,
    store: Arc<IdempotencyStore>,
    clock: Arc<dyn Clock>,
    event_handler: Arc<dyn EventHandler>,
    tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl RetryScheduler {
    /// Creates a scheduler that re-enqueues onto `queue`.
    pub fn new(
        queue: Arc<AdmissionQueue>,
        store: Arc<IdempotencyStore>,
        clock: Arc<dyn Clock>,
        event_handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            queue,
            store,
            clock,
            event_handler,
            tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Re-enqueues `job` after `delay` without blocking the caller.
    ///
    /// The job must already carry its incremented attempt count and its
    /// identifier's in-flight claim. After shutdown the retry is abandoned
    /// immediately.
    pub async fn schedule(&self, job: Job, event_id: EventId, delay: Duration) {
        if self.cancellation_token.is_cancelled() {
            self.abandon(&event_id, "retry scheduler is shut down").await;
            return;
        }

        debug!(
            event_id = %event_id,
            attempt = job.attempts + 1,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling retry"
        );

        let scheduler = self.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                () = scheduler.cancellation_token.cancelled() => {
                    scheduler.abandon(&event_id, "pending retry cancelled by shutdown").await;
                },
                () = scheduler.clock.sleep(delay) => {
                    scheduler.requeue(job, &event_id).await;
                },
            }
        });
    }

    /// Waits for room in the queue. Only shutdown abandons a due retry, since
    /// the sender has already been acknowledged and will not redeliver.
    async fn requeue(&self, job: Job, event_id: &EventId) {
        let attempt = job.attempts + 1;
        let result = tokio::select! {
            () = self.cancellation_token.cancelled() => {
                self.abandon(event_id, "retry cancelled by shutdown while waiting for queue room")
                    .await;
                return;
            },
            result = self.queue.enqueue_wait(job) => result,
        };

        match result {
            Ok(()) => debug!(event_id = %event_id, attempt, "retry re-enqueued"),
            Err(err) => {
                error!(
                    event_id = %event_id,
                    attempt,
                    code = err.to_payhook_error().code(),
                    error = %err,
                    "retry could not be re-enqueued"
                );
                self.abandon(event_id, &err.to_string()).await;
            },
        }
    }

    async fn abandon(&self, event_id: &EventId, reason: &str) {
        self.store.release(event_id);
        warn!(event_id = %event_id, reason, "retry abandoned, event left uncommitted");
        self.event_handler
            .handle_event(ProcessingEvent::RetryAbandoned {
                event_id: event_id.clone(),
                reason: reason.to_string(),
            })
            .await;
    }

    /// Number of retries currently waiting on their timer.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Cancels every pending retry and waits for the timer tasks to finish.
    pub async fn shutdown(&self) {
        info!(pending = self.pending(), "cancelling pending retries");
        self.cancellation_token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("retry scheduler stopped");
    }
}

//! Per-job processing pipeline run by each worker.
//!
//! A worker dequeues a job, parses it, claims its identifier, invokes the
//! processor, and routes the outcome: commit, retry, dead-letter, or release.
//! Workers share no state beyond the queue, the idempotency store, the retry
//! scheduler, and the statistics block.

use std::{sync::Arc, time::Duration};

use payhook_core::{
    Clock, CommitReason, DiscardReason, EventHandler, EventId, Job, PayhookError,
    ProcessingEvent, WebhookEvent,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::{
    classifier::ProcessingOutcome,
    idempotency::{Claim, IdempotencyStore},
    processor::EventProcessor,
    queue::AdmissionQueue,
    retry::{RetryDecision, RetryPolicy, RetryScheduler},
};

/// Configuration for the processing engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of concurrent workers.
    pub worker_count: usize,

    /// Admission queue capacity.
    pub queue_capacity: usize,

    /// Retry policy for transient failures.
    pub retry_policy: RetryPolicy,

    /// Maximum time to wait for workers during shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: crate::DEFAULT_WORKER_COUNT,
            queue_capacity: crate::DEFAULT_QUEUE_CAPACITY,
            retry_policy: RetryPolicy::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Counters for monitoring the processing engine.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    /// Workers currently running.
    pub active_workers: usize,
    /// Jobs taken off the queue, including retries and discards.
    pub jobs_dequeued: u64,
    /// Events committed after successful processing.
    pub succeeded: u64,
    /// Events committed after a permanent failure.
    pub permanent_failures: u64,
    /// Events committed after exhausting retries.
    pub dead_lettered: u64,
    /// Retries handed to the scheduler.
    pub retries_scheduled: u64,
    /// Jobs dropped as duplicates.
    pub duplicates: u64,
    /// Jobs dropped as unparseable.
    pub unparseable: u64,
    /// Unclassified failures left uncommitted.
    pub unknown_failures: u64,
}

/// Shared handles every worker needs.
#[derive(Debug, Clone)]
pub(crate) struct WorkerContext {
    pub queue: Arc<AdmissionQueue>,
    pub store: Arc<IdempotencyStore>,
    pub processor: Arc<dyn EventProcessor>,
    pub scheduler: RetryScheduler,
    pub retry_policy: RetryPolicy,
    pub stats: Arc<RwLock<EngineStats>>,
    pub clock: Arc<dyn Clock>,
    pub event_handler: Arc<dyn EventHandler>,
}

/// A single sequential consumer of the admission queue.
#[derive(Debug)]
pub(crate) struct ProcessingWorker {
    id: usize,
    ctx: WorkerContext,
}

impl ProcessingWorker {
    pub(crate) fn new(id: usize, ctx: WorkerContext) -> Self {
        Self { id, ctx }
    }

    /// Processes jobs until the queue is closed and drained.
    pub(crate) async fn run(&self) {
        debug!(worker_id = self.id, "worker waiting for jobs");

        while let Some(job) = self.ctx.queue.dequeue().await {
            self.ctx.stats.write().await.jobs_dequeued += 1;
            self.process_job(job).await;
        }

        debug!(worker_id = self.id, "admission queue exhausted");
    }

    async fn process_job(&self, job: Job) {
        let event = match job.parse() {
            Ok(event) => event,
            Err(e) => {
                let err = PayhookError::Unparseable { reason: e.to_string() };
                warn!(
                    worker_id = self.id,
                    code = err.code(),
                    error = %err,
                    payload_bytes = job.payload.len(),
                    "discarding unparseable job"
                );
                self.ctx.stats.write().await.unparseable += 1;
                self.emit(ProcessingEvent::Discarded {
                    event_id: None,
                    reason: DiscardReason::Unparseable,
                })
                .await;
                return;
            },
        };

        // Retried jobs already hold the claim taken on their first attempt.
        if !job.is_retry() {
            let claim = self.ctx.store.try_claim(&event.uuid);
            if !claim.is_claimed() {
                self.discard_duplicate(&event, claim).await;
                return;
            }
        }

        let attempt = job.attempts + 1;
        debug!(
            worker_id = self.id,
            event_id = %event.uuid,
            event_type = %event.event_type,
            attempt,
            "processing event"
        );

        let outcome = self.ctx.processor.process(&event).await;
        if let Some(class) = outcome.failure_class() {
            debug!(
                worker_id = self.id,
                event_id = %event.uuid,
                attempt,
                class = %class,
                "processing attempt failed"
            );
        }
        self.route(job, &event, outcome).await;
    }

    async fn discard_duplicate(&self, event: &WebhookEvent, claim: Claim) {
        warn!(
            worker_id = self.id,
            event_id = %event.uuid,
            in_flight = claim == Claim::InFlight,
            "duplicate event skipped"
        );
        self.ctx.stats.write().await.duplicates += 1;
        self.emit(ProcessingEvent::Discarded {
            event_id: Some(event.uuid.clone()),
            reason: DiscardReason::Duplicate,
        })
        .await;
    }

    async fn route(&self, job: Job, event: &WebhookEvent, outcome: ProcessingOutcome) {
        let attempt = job.attempts + 1;
        let event_id = &event.uuid;

        match outcome {
            ProcessingOutcome::Success => {
                info!(worker_id = self.id, event_id = %event_id, attempt, "event processed");
                self.ctx.stats.write().await.succeeded += 1;
                self.commit(event_id, CommitReason::Success, attempt).await;
            },
            ProcessingOutcome::Permanent(reason) => {
                let err = PayhookError::PermanentProcessing { event_id: event_id.clone(), reason };
                error!(
                    worker_id = self.id,
                    event_id = %event_id,
                    code = err.code(),
                    error = %err,
                    "permanent failure, event will not be retried"
                );
                self.ctx.stats.write().await.permanent_failures += 1;
                self.commit(event_id, CommitReason::Permanent, attempt).await;
            },
            ProcessingOutcome::Transient(reason) => {
                self.handle_transient(job, event_id, reason).await;
            },
            ProcessingOutcome::Unknown(reason) => {
                let err =
                    PayhookError::UnknownFailure { event_id: event_id.clone(), reason: reason.clone() };
                error!(
                    worker_id = self.id,
                    event_id = %event_id,
                    code = err.code(),
                    error = %err,
                    "unclassified failure, leaving event uncommitted"
                );
                self.ctx.store.release(event_id);
                self.ctx.stats.write().await.unknown_failures += 1;
                self.emit(ProcessingEvent::Released { event_id: event_id.clone(), reason }).await;
            },
        }
    }

    async fn handle_transient(&self, job: Job, event_id: &EventId, reason: String) {
        let job = job.next_attempt();
        let attempts = job.attempts;

        match self.ctx.retry_policy.decide(attempts) {
            RetryDecision::Retry { delay } => {
                let err = PayhookError::TransientProcessing {
                    event_id: event_id.clone(),
                    attempt: attempts,
                    reason,
                };
                warn!(
                    worker_id = self.id,
                    event_id = %event_id,
                    code = err.code(),
                    error = %err,
                    max_attempts = self.ctx.retry_policy.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "transient failure, retry scheduled"
                );
                self.ctx.stats.write().await.retries_scheduled += 1;
                self.emit(ProcessingEvent::Requeued {
                    event_id: event_id.clone(),
                    next_attempt: attempts + 1,
                    delay,
                })
                .await;
                self.ctx.scheduler.schedule(job, event_id.clone(), delay).await;
            },
            RetryDecision::GiveUp { attempts } => {
                let err = PayhookError::DeadLettered { event_id: event_id.clone(), attempts, reason };
                error!(
                    worker_id = self.id,
                    event_id = %event_id,
                    code = err.code(),
                    error = %err,
                    "CRITICAL: retries exhausted, event dead-lettered and requires manual intervention"
                );
                self.ctx.stats.write().await.dead_lettered += 1;
                self.commit(event_id, CommitReason::DeadLettered, attempts).await;
            },
        }
    }

    async fn commit(&self, event_id: &EventId, reason: CommitReason, attempts: u32) {
        if !self.ctx.store.commit(event_id) {
            warn!(worker_id = self.id, event_id = %event_id, "event was already committed");
        }
        self.emit(ProcessingEvent::Committed {
            event_id: event_id.clone(),
            reason,
            attempts,
            at: self.ctx.clock.now_utc(),
        })
        .await;
    }

    async fn emit(&self, event: ProcessingEvent) {
        self.ctx.event_handler.handle_event(event).await;
    }
}

//! Processing engine wiring.
//!
//! Owns the admission queue, the idempotency store, the retry scheduler and
//! the worker pool, and tears them down in an order that never lets a retry
//! timer push into a closed queue.

use std::sync::Arc;

use payhook_core::{Clock, EventHandler, NoOpEventHandler, RealClock};
use tokio::sync::RwLock;
use tracing::info;

use crate::{
    error::{Result, WorkerError},
    idempotency::IdempotencyStore,
    processor::EventProcessor,
    queue::AdmissionQueue,
    retry::RetryScheduler,
    worker::{EngineConfig, EngineStats, WorkerContext},
    worker_pool::WorkerPool,
};

/// Coordinates the asynchronous processing pipeline.
pub struct ProcessingEngine {
    config: EngineConfig,
    queue: Arc<AdmissionQueue>,
    store: Arc<IdempotencyStore>,
    scheduler: RetryScheduler,
    processor: Arc<dyn EventProcessor>,
    stats: Arc<RwLock<EngineStats>>,
    clock: Arc<dyn Clock>,
    event_handler: Arc<dyn EventHandler>,
    worker_pool: Option<WorkerPool>,
}

impl ProcessingEngine {
    /// Creates an engine with a real clock and no event subscribers.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Configuration` if the configuration is invalid.
    pub fn new(config: EngineConfig, processor: Arc<dyn EventProcessor>) -> Result<Self> {
        Self::with_event_handler(config, processor, Arc::new(RealClock), Arc::new(NoOpEventHandler))
    }

    /// Creates an engine with an injected clock and event handler.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Configuration` if the worker count, queue
    /// capacity, or retry budget is zero.
    pub fn with_event_handler(
        config: EngineConfig,
        processor: Arc<dyn EventProcessor>,
        clock: Arc<dyn Clock>,
        event_handler: Arc<dyn EventHandler>,
    ) -> Result<Self> {
        if config.worker_count == 0 {
            return Err(WorkerError::configuration("worker_count must be at least 1"));
        }
        if config.queue_capacity == 0 {
            return Err(WorkerError::configuration("queue_capacity must be at least 1"));
        }
        if config.retry_policy.max_attempts == 0 {
            return Err(WorkerError::configuration("retry max_attempts must be at least 1"));
        }

        let queue = Arc::new(AdmissionQueue::new(config.queue_capacity));
        let store = Arc::new(IdempotencyStore::new());
        let scheduler =
            RetryScheduler::new(queue.clone(), store.clone(), clock.clone(), event_handler.clone());

        Ok(Self {
            config,
            queue,
            store,
            scheduler,
            processor,
            stats: Arc::new(RwLock::new(EngineStats::default())),
            clock,
            event_handler,
            worker_pool: None,
        })
    }

    /// Spawns the worker pool.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::AlreadyStarted` if called twice.
    pub async fn start(&mut self) -> Result<()> {
        if self.worker_pool.is_some() {
            return Err(WorkerError::AlreadyStarted);
        }

        info!(
            worker_count = self.config.worker_count,
            queue_capacity = self.config.queue_capacity,
            max_attempts = self.config.retry_policy.max_attempts,
            retry_delay_ms = u64::try_from(self.config.retry_policy.base_delay.as_millis())
                .unwrap_or(u64::MAX),
            backoff = %self.config.retry_policy.backoff_strategy,
            "starting processing engine"
        );

        let ctx = WorkerContext {
            queue: self.queue.clone(),
            store: self.store.clone(),
            processor: self.processor.clone(),
            scheduler: self.scheduler.clone(),
            retry_policy: self.config.retry_policy.clone(),
            stats: self.stats.clone(),
            clock: self.clock.clone(),
            event_handler: self.event_handler.clone(),
        };

        let mut pool = WorkerPool::new(self.config.worker_count, ctx);
        pool.spawn_workers().await;
        self.worker_pool = Some(pool);

        info!("processing engine started");
        Ok(())
    }

    /// Stops the pipeline.
    ///
    /// Pending retry timers are cancelled first, then the queue is closed,
    /// then workers drain what is buffered and exit.
    ///
    /// # Errors
    ///
    /// Returns an error if workers do not exit within the shutdown timeout or
    /// a worker panicked.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down processing engine");

        self.scheduler.shutdown().await;
        self.queue.close();

        let result = match self.worker_pool.take() {
            Some(pool) => pool.shutdown_graceful(self.config.shutdown_timeout).await,
            None => Ok(()),
        };

        let stats = self.stats.read().await.clone();
        info!(
            succeeded = stats.succeeded,
            permanent_failures = stats.permanent_failures,
            dead_lettered = stats.dead_lettered,
            unknown_failures = stats.unknown_failures,
            committed = self.store.len(),
            "processing engine stopped"
        );

        result
    }

    /// Shared admission queue handle for the ingress path.
    pub fn queue(&self) -> Arc<AdmissionQueue> {
        self.queue.clone()
    }

    /// Shared idempotency store handle.
    pub fn store(&self) -> Arc<IdempotencyStore> {
        self.store.clone()
    }

    /// Shared statistics handle.
    pub fn stats_handle(&self) -> Arc<RwLock<EngineStats>> {
        self.stats.clone()
    }

    /// Snapshot of current statistics.
    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }

    /// Number of retries waiting on their timer.
    pub fn pending_retries(&self) -> usize {
        self.scheduler.pending()
    }

    /// Whether workers are currently running.
    pub fn is_running(&self) -> bool {
        self.worker_pool.as_ref().is_some_and(WorkerPool::has_active_workers)
    }
}

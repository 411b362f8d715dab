//! Test infrastructure for the payhook pipeline.
//!
//! Provides payload fixtures, request signing, a scripted processor, an
//! event recorder, and [`TestEnv`], which wires a processing engine to all of
//! them with a virtual clock so retry delays cost no wall time.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use payhook_core::{EventId, Job, TestClock};
use payhook_worker::{
    AdmissionQueue, EngineConfig, EngineStats, IdempotencyStore, ProcessingEngine, QueueError,
    RetryPolicy, WorkerError,
};
use tokio::sync::RwLock;

pub mod events;
pub mod fixtures;
pub mod processor;

pub use events::RecordingEventHandler;
pub use fixtures::{event_body, sign, verification_body, EventBuilder, TEST_SECRET};
pub use processor::ScriptedProcessor;

/// Default time tests wait for asynchronous processing.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Processing engine wired to test doubles.
pub struct TestEnv {
    engine: ProcessingEngine,
    /// Scripted processor receiving every processing call.
    pub processor: Arc<ScriptedProcessor>,
    /// Recorder receiving every lifecycle event.
    pub events: Arc<RecordingEventHandler>,
    /// Virtual clock driving retry delays.
    pub clock: TestClock,
}

impl TestEnv {
    /// Starts building an environment.
    pub fn builder() -> TestEnvBuilder {
        TestEnvBuilder::default()
    }

    /// Builds and starts an environment with default settings.
    ///
    /// # Panics
    ///
    /// Panics if the engine cannot be started.
    pub async fn start() -> Self {
        Self::builder().start().await
    }

    /// Starts workers on an environment created with
    /// [`TestEnvBuilder::build`].
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::AlreadyStarted` if already running.
    pub async fn start_workers(&mut self) -> Result<(), WorkerError> {
        self.engine.start().await
    }

    /// Admission queue handle.
    pub fn queue(&self) -> Arc<AdmissionQueue> {
        self.engine.queue()
    }

    /// Idempotency store handle.
    pub fn store(&self) -> Arc<IdempotencyStore> {
        self.engine.store()
    }

    /// Shared engine counters, as handed to the HTTP layer.
    pub fn stats_handle(&self) -> Arc<RwLock<EngineStats>> {
        self.engine.stats_handle()
    }

    /// Engine statistics snapshot.
    pub async fn stats(&self) -> EngineStats {
        self.engine.stats().await
    }

    /// Enqueues a raw payload as a fresh job.
    ///
    /// # Errors
    ///
    /// Returns the queue's rejection.
    pub fn deliver(&self, body: impl Into<Bytes>) -> Result<(), QueueError> {
        self.queue().enqueue(Job::new(body))
    }

    /// Waits for `id` to reach a terminal lifecycle event.
    pub async fn wait_for_terminal(&self, id: &str) -> bool {
        self.events.wait_for_terminal(&EventId::from(id), WAIT_TIMEOUT).await
    }

    /// Waits for `count` terminal lifecycle events in total.
    pub async fn wait_for_terminal_events(&self, count: usize) -> bool {
        self.events.wait_for_terminal_events(count, WAIT_TIMEOUT).await
    }

    /// Shuts the engine down.
    ///
    /// # Errors
    ///
    /// Returns the engine's shutdown error.
    pub async fn shutdown(self) -> Result<(), WorkerError> {
        self.engine.shutdown().await
    }
}

/// Builder for [`TestEnv`].
#[derive(Debug)]
pub struct TestEnvBuilder {
    config: EngineConfig,
    processor: ScriptedProcessor,
}

impl Default for TestEnvBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig {
                worker_count: 2,
                queue_capacity: 16,
                retry_policy: RetryPolicy::fixed(3, Duration::from_secs(10)),
                shutdown_timeout: Duration::from_secs(5),
            },
            processor: ScriptedProcessor::new(),
        }
    }
}

impl TestEnvBuilder {
    /// Sets the worker count.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    /// Uses a preconfigured processor.
    #[must_use]
    pub fn processor(mut self, processor: ScriptedProcessor) -> Self {
        self.processor = processor;
        self
    }

    /// Builds the environment without starting workers.
    ///
    /// # Panics
    ///
    /// Panics if the engine configuration is invalid.
    pub fn build(self) -> TestEnv {
        let processor = Arc::new(self.processor);
        let events = Arc::new(RecordingEventHandler::new());
        let clock = TestClock::new();

        let engine = ProcessingEngine::with_event_handler(
            self.config,
            processor.clone(),
            Arc::new(clock.clone()),
            events.clone(),
        )
        .expect("valid test engine configuration");

        TestEnv { engine, processor, events, clock }
    }

    /// Builds the environment and starts its workers.
    ///
    /// # Panics
    ///
    /// Panics if the engine cannot be started.
    pub async fn start(self) -> TestEnv {
        let mut env = self.build();
        env.engine.start().await.expect("engine starts");
        env
    }
}

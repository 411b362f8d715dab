//! Bounded admission queue between the ingress path and the workers.
//!
//! Ingress enqueue never waits: a full queue rejects immediately so the HTTP
//! handler can answer 503 and let the sender redeliver later. Retries, which
//! the sender will not redeliver, wait for room instead. Dequeue waits until
//! a job is available or the queue is closed and drained.

use tokio::sync::{
    mpsc::{self, error::TrySendError},
    Mutex,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use payhook_core::Job;

use crate::error::QueueError;

/// Bounded multi-producer, multi-consumer FIFO of jobs.
///
/// Workers share the single receiver behind an async mutex; whichever
/// worker holds the lock waits for the next job, the rest wait for the lock.
#[derive(Debug)]
pub struct AdmissionQueue {
    sender: mpsc::Sender<Job>,
    receiver: Mutex<mpsc::Receiver<Job>>,
    closed: CancellationToken,
    capacity: usize,
}

impl AdmissionQueue {
    /// Creates a queue holding at most `capacity` jobs.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; configuration validation rejects that
    /// before a queue is built.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self { sender, receiver: Mutex::new(receiver), closed: CancellationToken::new(), capacity }
    }

    /// Adds a job without waiting.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::CapacityExceeded` if the queue is full and
    /// `QueueError::Closed` after [`close`](Self::close). The job is handed
    /// back in both cases and the queue is left untouched.
    pub fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        if self.closed.is_cancelled() {
            return Err(QueueError::Closed { job });
        }

        match self.sender.try_send(job) {
            Ok(()) => {
                debug!(depth = self.len(), capacity = self.capacity, "job admitted");
                Ok(())
            },
            Err(TrySendError::Full(job)) => {
                Err(QueueError::CapacityExceeded { job, capacity: self.capacity })
            },
            Err(TrySendError::Closed(job)) => Err(QueueError::Closed { job }),
        }
    }

    /// Adds a job, waiting for room if the queue is full.
    ///
    /// Used for retries that already hold their idempotency claim. Callers
    /// race this against their own cancellation; dropping the future leaves
    /// the queue untouched.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Closed` with the job if the queue is closed
    /// before or while waiting.
    pub async fn enqueue_wait(&self, job: Job) -> Result<(), QueueError> {
        if self.closed.is_cancelled() {
            return Err(QueueError::Closed { job });
        }

        let permit = tokio::select! {
            permit = self.sender.reserve() => permit,
            () = self.closed.cancelled() => return Err(QueueError::Closed { job }),
        };

        match permit {
            Ok(permit) => {
                permit.send(job);
                debug!(depth = self.len(), capacity = self.capacity, "job admitted after waiting");
                Ok(())
            },
            Err(_) => Err(QueueError::Closed { job }),
        }
    }

    /// Waits for the next job.
    ///
    /// Returns `None` once the queue is closed and every buffered job has
    /// been handed out. Jobs still buffered at close time are delivered
    /// first.
    pub async fn dequeue(&self) -> Option<Job> {
        let mut receiver = self.receiver.lock().await;

        tokio::select! {
            biased;
            job = receiver.recv() => job,
            () = self.closed.cancelled() => receiver.try_recv().ok(),
        }
    }

    /// Stops admitting jobs and wakes waiting consumers once drained.
    ///
    /// Idempotent.
    pub fn close(&self) {
        if !self.closed.is_cancelled() {
            info!(buffered = self.len(), "closing admission queue");
            self.closed.cancel();
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Number of buffered jobs.
    pub fn len(&self) -> usize {
        self.capacity.saturating_sub(self.sender.capacity())
    }

    /// Whether no jobs are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

//! Fixed-size pool of processing workers.
//!
//! Workers stop on their own when the admission queue is closed and drained;
//! the pool only spawns them and waits for them to finish.

use std::{panic::AssertUnwindSafe, time::Duration};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    error::{Result, WorkerError},
    worker::{ProcessingWorker, WorkerContext},
};

/// Supervises the worker tasks draining the admission queue.
pub struct WorkerPool {
    worker_count: usize,
    ctx: WorkerContext,
    worker_handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn new(worker_count: usize, ctx: WorkerContext) -> Self {
        Self { worker_count, ctx, worker_handles: Vec::new() }
    }

    /// Spawns all configured workers and returns immediately.
    pub(crate) async fn spawn_workers(&mut self) {
        info!(worker_count = self.worker_count, "spawning processing workers");

        self.ctx.stats.write().await.active_workers = self.worker_count;

        for worker_id in 0..self.worker_count {
            let worker = ProcessingWorker::new(worker_id, self.ctx.clone());
            let stats = self.ctx.stats.clone();

            let handle = tokio::spawn(async move {
                info!(worker_id, "processing worker starting");

                let result = AssertUnwindSafe(worker.run()).catch_unwind().await;

                {
                    let mut stats = stats.write().await;
                    stats.active_workers = stats.active_workers.saturating_sub(1);
                }

                match result {
                    Ok(()) => info!(worker_id, "processing worker stopped gracefully"),
                    Err(panic) => {
                        error!(worker_id, "processing worker panicked");
                        std::panic::resume_unwind(panic);
                    },
                }
            });

            self.worker_handles.push(handle);
        }
    }

    /// Waits for every worker to exit after the queue has been closed.
    ///
    /// Each worker finishes its current job and any jobs still buffered.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::ShutdownTimeout` if workers are still running
    /// after `timeout`, or `WorkerError::WorkerPanic` if a worker panicked.
    pub(crate) async fn shutdown_graceful(mut self, timeout: Duration) -> Result<()> {
        info!(
            worker_count = self.worker_handles.len(),
            timeout_seconds = timeout.as_secs(),
            "waiting for workers to drain the queue"
        );

        if !self.ctx.queue.is_closed() {
            warn!("worker pool shut down before the admission queue was closed, closing it now");
            self.ctx.queue.close();
        }

        let handles = std::mem::take(&mut self.worker_handles);
        let join_all = async {
            let mut first_panic = None;

            for (worker_id, handle) in handles.into_iter().enumerate() {
                match handle.await {
                    Ok(()) => {},
                    Err(join_error) => {
                        error!(worker_id, error = %join_error, "worker task panicked");
                        first_panic.get_or_insert(WorkerError::WorkerPanic {
                            worker_id,
                            error: join_error.to_string(),
                        });
                    },
                }
            }

            first_panic
        };

        let result = match tokio::time::timeout(timeout, join_all).await {
            Ok(None) => {
                info!("worker pool shutdown completed");
                Ok(())
            },
            Ok(Some(panic)) => Err(panic),
            Err(_elapsed) => {
                error!(
                    timeout_seconds = timeout.as_secs(),
                    "worker shutdown timed out, some workers may still be running"
                );
                Err(WorkerError::ShutdownTimeout { timeout })
            },
        };

        self.ctx.stats.write().await.active_workers = 0;
        result
    }

    /// Whether any worker task is still running.
    pub fn has_active_workers(&self) -> bool {
        self.worker_handles.iter().any(|h| !h.is_finished())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let active = self.worker_handles.iter().filter(|h| !h.is_finished()).count();

        if active > 0 && !self.ctx.queue.is_closed() {
            error!(
                active_workers = active,
                "WorkerPool dropped with active workers, closing admission queue so they exit"
            );
            self.ctx.queue.close();
        }
    }
}

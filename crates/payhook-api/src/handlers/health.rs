//! Health check handlers for service monitoring.
//!
//! Reports admission queue pressure and pipeline counters. The service is
//! unhealthy once the queue is closed, since no new events can be admitted.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use payhook_core::Clock;
use payhook_worker::{AdmissionQueue, EngineStats};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::AppState;

/// Queue fill ratio above which the service reports itself degraded.
const DEGRADED_QUEUE_RATIO: f64 = 0.9;

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// Timestamp when health check was performed
    pub timestamp: DateTime<Utc>,
    /// Individual component health checks
    pub checks: HealthChecks,
    /// Pipeline counters since startup
    pub stats: EngineStats,
    /// Service version information
    pub version: String,
}

/// Overall health status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Queue close to capacity
    Degraded,
    /// Queue closed
    Unhealthy,
}

/// Individual component health check results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Admission queue state
    pub queue: QueueHealth,
    /// Worker pool state
    pub workers: WorkerHealth,
}

/// Admission queue health.
#[derive(Debug, Serialize)]
pub struct QueueHealth {
    /// Component status
    pub status: ComponentStatus,
    /// Jobs waiting
    pub depth: usize,
    /// Configured capacity
    pub capacity: usize,
    /// Whether admission has stopped
    pub closed: bool,
}

/// Worker pool health.
#[derive(Debug, Serialize)]
pub struct WorkerHealth {
    /// Component status
    pub status: ComponentStatus,
    /// Configured worker count
    pub configured: usize,
    /// Workers currently running
    pub active: usize,
}

/// Component-level health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is healthy
    Up,
    /// Component is experiencing issues
    Down,
}

/// Health service that encapsulates clock dependency for testable health
/// checks.
pub struct HealthService {
    clock: Arc<dyn Clock>,
}

impl HealthService {
    /// Creates a new health service with the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Builds a health report from the queue and engine counters.
    pub fn health_check(
        &self,
        queue: &AdmissionQueue,
        configured_workers: usize,
        stats: EngineStats,
    ) -> HealthResponse {
        let depth = queue.len();
        let capacity = queue.capacity();
        let closed = queue.is_closed();

        let queue_status = if closed { ComponentStatus::Down } else { ComponentStatus::Up };
        let worker_status =
            if stats.active_workers > 0 { ComponentStatus::Up } else { ComponentStatus::Down };

        #[allow(clippy::cast_precision_loss)]
        let fill_ratio = depth as f64 / capacity.max(1) as f64;

        let status = if closed {
            HealthStatus::Unhealthy
        } else if fill_ratio >= DEGRADED_QUEUE_RATIO
            || worker_status == ComponentStatus::Down
            || stats.active_workers < configured_workers
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthResponse {
            status,
            timestamp: self.clock.now_utc(),
            checks: HealthChecks {
                queue: QueueHealth { status: queue_status, depth, capacity, closed },
                workers: WorkerHealth {
                    status: worker_status,
                    configured: configured_workers,
                    active: stats.active_workers,
                },
            },
            stats,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check endpoint handler.
///
/// Cheap enough to be polled frequently by load balancers.
#[instrument(name = "health_check", skip(app_state))]
pub async fn health_check(State(app_state): State<AppState>) -> Response {
    let stats = app_state.stats.read().await.clone();
    let response = HealthService::new(app_state.clock.clone()).health_check(
        &app_state.queue,
        app_state.worker_count,
        stats,
    );

    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    debug!(
        status = ?response.status,
        queue_depth = response.checks.queue.depth,
        "Health check completed"
    );

    (status_code, Json(response)).into_response()
}

/// Liveness check endpoint.
///
/// Only confirms the HTTP server is responding.
#[instrument(name = "liveness_check", skip(app_state))]
pub async fn liveness_check(State(app_state): State<AppState>) -> Response {
    let response = serde_json::json!({
        "status": "alive",
        "timestamp": app_state.clock.now_utc(),
        "service": "payhook"
    });

    (StatusCode::OK, Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use payhook_core::{Job, TestClock};

    use super::*;

    fn service() -> HealthService {
        HealthService::new(Arc::new(TestClock::new()))
    }

    fn running() -> EngineStats {
        EngineStats { active_workers: 2, ..EngineStats::default() }
    }

    #[test]
    fn open_queue_with_workers_is_healthy() {
        let queue = AdmissionQueue::new(10);
        let report = service().health_check(&queue, 2, running());

        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.checks.queue.capacity, 10);
        assert_eq!(report.checks.workers.active, 2);
    }

    #[test]
    fn nearly_full_queue_is_degraded() {
        let queue = AdmissionQueue::new(10);
        for i in 0..9 {
            queue.enqueue(Job::new(i.to_string())).unwrap();
        }

        let report = service().health_check(&queue, 2, running());
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.checks.queue.depth, 9);
    }

    #[test]
    fn lost_worker_is_degraded() {
        let queue = AdmissionQueue::new(10);
        let stats = EngineStats { active_workers: 1, ..EngineStats::default() };

        let report = service().health_check(&queue, 2, stats);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.checks.workers.status, ComponentStatus::Up);
        assert_eq!(report.checks.workers.active, 1);
    }

    #[test]
    fn closed_queue_is_unhealthy() {
        let queue = AdmissionQueue::new(10);
        queue.close();

        let report = service().health_check(&queue, 2, running());
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.checks.queue.status, ComponentStatus::Down);
    }
}

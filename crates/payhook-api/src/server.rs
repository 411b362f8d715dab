//! HTTP server configuration and request routing.
//!
//! Requests flow through middleware in order:
//! 1. Request ID generation
//! 2. Request/response logging
//! 3. Timeout enforcement
//! 4. Signature verification (`/webhooks` only)
//! 5. Handler execution
//!
//! # Graceful Shutdown
//!
//! The server stops accepting connections when its shutdown future resolves
//! and waits for in-flight requests. Draining the processing engine is the
//! caller's job, after the server has stopped admitting events.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use payhook_core::Clock;
use payhook_worker::{AdmissionQueue, EngineStats, ProcessingEngine};
use tokio::sync::RwLock;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    crypto::SignatureVerifier,
    handlers::{self, setup::SubscriptionClient},
    middleware::verify_signature,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Body signature verifier
    pub verifier: Arc<SignatureVerifier>,
    /// Admission queue shared with the workers
    pub queue: Arc<AdmissionQueue>,
    /// Engine counters
    pub stats: Arc<RwLock<EngineStats>>,
    /// Platform subscription client
    pub subscriptions: Arc<SubscriptionClient>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Configured worker count
    pub worker_count: usize,
    /// Largest accepted webhook body
    pub max_body_bytes: usize,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl AppState {
    /// Builds handler state around a running engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription client cannot be built.
    pub fn new(
        config: &Config,
        engine: &ProcessingEngine,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let subscriptions = SubscriptionClient::new(
            config.api_base_url.clone(),
            config.api_token.clone(),
            Duration::from_secs(config.api_timeout_seconds),
        )?;

        Ok(Self {
            verifier: Arc::new(SignatureVerifier::new(config.signing_secret().map(String::from))),
            queue: engine.queue(),
            stats: engine.stats_handle(),
            subscriptions: Arc::new(subscriptions),
            clock,
            worker_count: config.worker_count,
            max_body_bytes: config.max_body_bytes,
            request_timeout: Duration::from_secs(config.request_timeout),
        })
    }
}

/// Creates the Axum router with all routes and middleware.
///
/// Only `/webhooks` sits behind signature verification; the setup and
/// health routes are operator-facing.
pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/live", get(handlers::liveness_check));

    let webhook_routes = Router::new()
        .route("/webhooks", post(handlers::receive_webhook))
        .layer(middleware::from_fn_with_state(state.clone(), verify_signature));

    let admin_routes = Router::new().route("/admin/setup-webhook", post(handlers::setup_webhook));

    Router::new()
        .merge(health_routes)
        .merge(webhook_routes)
        .merge(admin_routes)
        .layer(TimeoutLayer::new(state.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Middleware to inject request ID into all responses.
///
/// Adds X-Request-Id header for tracing requests across services.
async fn inject_request_id(mut req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }

    response
}

/// Starts the HTTP server and serves until `shutdown` resolves.
///
/// # Errors
///
/// Returns `std::io::Error` if the address cannot be bound.
pub async fn start_server<F>(
    state: AppState,
    addr: SocketAddr,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("HTTP server listening on {}", actual_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    warn!("No longer accepting requests; draining in-flight work");
}

//! End-to-end tests: signed HTTP request to committed event.
//!
//! Wires the real router to a processing engine driven by a scripted
//! processor and virtual clock, then checks what the sender sees and what
//! the pipeline does with it.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use bytes::Bytes;
use payhook_api::{
    create_router, handlers::setup::SubscriptionClient, AppState, SignatureVerifier,
    SIGNATURE_HEADER,
};
use payhook_core::{CommitReason, EventId, ProcessingEvent};
use payhook_testing::{event_body, sign, ScriptedProcessor, TestEnv, TEST_SECRET, WAIT_TIMEOUT};
use payhook_worker::{ProcessingOutcome, RetryPolicy};
use tower::ServiceExt;

fn router_for(env: &TestEnv) -> Router {
    let state = AppState {
        verifier: Arc::new(SignatureVerifier::new(Some(TEST_SECRET.to_string()))),
        queue: env.queue(),
        stats: env.stats_handle(),
        subscriptions: Arc::new(
            SubscriptionClient::new("http://127.0.0.1:1", "token", Duration::from_secs(1))
                .expect("subscription client"),
        ),
        clock: Arc::new(env.clock.clone()),
        worker_count: 2,
        max_body_bytes: 1024 * 1024,
        request_timeout: Duration::from_secs(5),
    };
    create_router(state)
}

async fn post_signed(router: &Router, body: Bytes) -> StatusCode {
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, sign(&body, TEST_SECRET))
        .body(Body::from(body))
        .expect("request build");

    router.clone().oneshot(request).await.expect("request execution").status()
}

#[tokio::test]
async fn signed_event_is_processed_and_committed() {
    let env = TestEnv::start().await;
    let router = router_for(&env);

    let status = post_signed(&router, event_body("e2e-success", "company.updated")).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(env.wait_for_terminal("e2e-success").await);
    assert_eq!(
        env.events.commit_reason(&EventId::from("e2e-success")),
        Some(CommitReason::Success)
    );

    env.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn redelivered_event_is_accepted_but_processed_once() {
    let env = TestEnv::builder().workers(1).start().await;
    let router = router_for(&env);

    for _ in 0..3 {
        let body = event_body("e2e-redelivered", "company.updated");
        let status = post_signed(&router, body).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    assert!(env.wait_for_terminal_events(3).await);
    assert_eq!(env.processor.call_count("e2e-redelivered"), 1);
    assert_eq!(env.stats().await.duplicates, 2);

    env.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn persistent_transient_failure_is_dead_lettered() {
    let processor = ScriptedProcessor::new();
    processor.always("e2e-flaky", ProcessingOutcome::Transient("system_error".to_string()));
    let env = TestEnv::builder()
        .retry_policy(RetryPolicy::fixed(3, Duration::from_secs(10)))
        .processor(processor)
        .start()
        .await;
    let router = router_for(&env);

    let status = post_signed(&router, event_body("e2e-flaky", "company.updated")).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let id = EventId::from("e2e-flaky");
    assert!(
        env.events
            .wait_until(WAIT_TIMEOUT, |events| {
                events.iter().any(|e| matches!(e, ProcessingEvent::Committed { .. }))
            })
            .await
    );
    assert!(env.store().contains(&id));
    assert_eq!(env.processor.call_count("e2e-flaky"), 3);
    assert_eq!(env.events.commit_reason(&id), Some(CommitReason::DeadLettered));
    assert_eq!(env.clock.recorded_sleeps(), vec![Duration::from_secs(10); 2]);

    env.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn backpressure_rejects_when_workers_fall_behind() {
    let env = TestEnv::builder().queue_capacity(2).build();
    let router = router_for(&env);

    let mut statuses = Vec::new();
    for i in 0..4 {
        let body = event_body(&format!("e2e-bp-{i}"), "company.updated");
        statuses.push(post_signed(&router, body).await);
    }

    assert_eq!(
        statuses,
        vec![
            StatusCode::ACCEPTED,
            StatusCode::ACCEPTED,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::SERVICE_UNAVAILABLE,
        ]
    );

    env.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn requests_after_shutdown_are_refused() {
    let env = TestEnv::start().await;
    let router = router_for(&env);

    env.shutdown().await.expect("clean shutdown");

    let status = post_signed(&router, event_body("e2e-late", "company.updated")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let health = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request build"))
        .await
        .expect("request execution");
    assert_eq!(health.status(), StatusCode::SERVICE_UNAVAILABLE);
}

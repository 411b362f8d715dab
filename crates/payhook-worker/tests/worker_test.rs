//! Integration tests for the per-job processing pipeline.
//!
//! Drives the engine through its admission queue with a scripted processor
//! and checks the idempotency store and lifecycle events after each
//! terminal outcome.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use payhook_core::{CommitReason, DiscardReason, EventId, Job, ProcessingEvent, WebhookEvent};
use payhook_testing::{event_body, ScriptedProcessor, TestEnv, WAIT_TIMEOUT};
use payhook_worker::{
    EngineConfig, EventProcessor, ProcessingEngine, ProcessingOutcome, RetryPolicy, WorkerError,
};

#[tokio::test]
async fn successful_event_is_committed() {
    let env = TestEnv::builder().workers(1).start().await;

    env.deliver(event_body("success-uuid-123", "company.created")).unwrap();

    assert!(env.wait_for_terminal("success-uuid-123").await);
    assert!(env.store().contains(&EventId::from("success-uuid-123")));
    assert_eq!(
        env.events.commit_reason(&EventId::from("success-uuid-123")),
        Some(CommitReason::Success)
    );
    assert_eq!(env.processor.call_count("success-uuid-123"), 1);

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn permanent_failure_is_committed_without_retry() {
    let processor = ScriptedProcessor::new();
    processor.always(
        "permanent-uuid-789",
        ProcessingOutcome::Permanent("invalid_request_error: company not found".to_string()),
    );
    let env = TestEnv::builder().processor(processor).start().await;

    env.deliver(event_body("permanent-uuid-789", "company.deleted")).unwrap();

    assert!(env.wait_for_terminal("permanent-uuid-789").await);
    let id = EventId::from("permanent-uuid-789");
    assert!(env.store().contains(&id));
    assert_eq!(env.events.commit_reason(&id), Some(CommitReason::Permanent));
    assert_eq!(env.events.requeue_count(&id), 0);
    assert_eq!(env.processor.call_count("permanent-uuid-789"), 1);

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn pre_committed_event_is_not_processed() {
    let env = TestEnv::start().await;
    let id = EventId::from("duplicate-uuid-abc");
    env.store().commit(&id);

    env.deliver(event_body("duplicate-uuid-abc", "company.created")).unwrap();

    assert!(env.wait_for_terminal("duplicate-uuid-abc").await);
    assert_eq!(env.processor.total_calls(), 0);
    assert_eq!(env.store().len(), 1);
    assert_eq!(
        env.events.events_for(&id),
        vec![ProcessingEvent::Discarded {
            event_id: Some(id.clone()),
            reason: DiscardReason::Duplicate
        }]
    );

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn sequential_duplicate_delivery_processes_once() {
    let env = TestEnv::builder().workers(1).start().await;

    env.deliver(event_body("dup-seq", "company.created")).unwrap();
    assert!(env.wait_for_terminal("dup-seq").await);
    env.deliver(event_body("dup-seq", "company.created")).unwrap();
    assert!(env.wait_for_terminal_events(2).await);

    assert_eq!(env.processor.call_count("dup-seq"), 1);
    assert_eq!(env.store().len(), 1);
    assert_eq!(env.stats().await.duplicates, 1);

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn concurrent_duplicate_delivery_processes_once() {
    let processor = ScriptedProcessor::new().with_latency(Duration::from_millis(50));
    let env = TestEnv::builder().workers(4).processor(processor).start().await;

    for _ in 0..4 {
        env.deliver(event_body("dup-concurrent", "company.created")).unwrap();
    }

    assert!(env.wait_for_terminal_events(4).await);
    assert_eq!(env.processor.call_count("dup-concurrent"), 1);
    assert_eq!(env.store().len(), 1);
    assert_eq!(env.stats().await.duplicates, 3);

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_payload_leaves_store_untouched() {
    let env = TestEnv::start().await;

    env.deliver(r#"{"invalid-json"#).unwrap();

    assert!(env.wait_for_terminal_events(1).await);
    assert!(env.store().is_empty());
    assert_eq!(env.processor.total_calls(), 0);
    assert_eq!(env.stats().await.unparseable, 1);
    assert_eq!(
        env.events.events(),
        vec![ProcessingEvent::Discarded { event_id: None, reason: DiscardReason::Unparseable }]
    );

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_failure_is_left_uncommitted_and_redelivery_is_new_work() {
    let processor = ScriptedProcessor::new();
    processor.script(
        "unknown-uuid",
        vec![
            ProcessingOutcome::Unknown("unrecognized response".to_string()),
            ProcessingOutcome::Success,
        ],
    );
    let env = TestEnv::builder().workers(1).processor(processor).start().await;
    let id = EventId::from("unknown-uuid");

    env.deliver(event_body("unknown-uuid", "company.updated")).unwrap();
    assert!(env.wait_for_terminal("unknown-uuid").await);

    assert!(!env.store().contains(&id));
    assert!(!env.store().is_in_flight(&id));
    assert_eq!(env.events.requeue_count(&id), 0);

    env.deliver(event_body("unknown-uuid", "company.updated")).unwrap();
    assert!(env.events.wait_until(payhook_testing::WAIT_TIMEOUT, |events| {
        events.iter().any(|e| matches!(e, ProcessingEvent::Committed { .. }))
    })
    .await);

    assert!(env.store().contains(&id));
    assert_eq!(env.processor.call_count("unknown-uuid"), 2);

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn transient_failure_then_success_is_committed_once() {
    let processor = ScriptedProcessor::new();
    processor.script(
        "flaky-uuid",
        vec![
            ProcessingOutcome::Transient("server_error".to_string()),
            ProcessingOutcome::Success,
        ],
    );
    let env = TestEnv::builder()
        .retry_policy(RetryPolicy::fixed(5, Duration::from_secs(10)))
        .processor(processor)
        .start()
        .await;
    let id = EventId::from("flaky-uuid");

    env.deliver(event_body("flaky-uuid", "company.updated")).unwrap();

    assert!(env.events.wait_until(payhook_testing::WAIT_TIMEOUT, |events| {
        events.iter().any(|e| matches!(e, ProcessingEvent::Committed { .. }))
    })
    .await);
    assert_eq!(env.events.commit_reason(&id), Some(CommitReason::Success));
    assert_eq!(env.events.requeue_count(&id), 1);
    assert_eq!(env.processor.call_count("flaky-uuid"), 2);
    assert_eq!(env.clock.recorded_sleeps(), vec![Duration::from_secs(10)]);

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn duplicate_arriving_during_retry_is_dropped() {
    let processor = ScriptedProcessor::new();
    processor.always("in-flight", ProcessingOutcome::Transient("rate_limit_error".to_string()));
    let mut env = TestEnv::builder()
        .workers(1)
        .retry_policy(RetryPolicy::fixed(2, Duration::from_secs(1)))
        .processor(processor)
        .build();
    let id = EventId::from("in-flight");

    // Claim held by a retrying job makes a fresh delivery a duplicate.
    env.store().try_claim(&id);
    env.deliver(event_body("in-flight", "company.updated")).unwrap();
    env.start_workers().await.unwrap();

    assert!(env.wait_for_terminal("in-flight").await);
    assert_eq!(env.processor.total_calls(), 0);
    assert!(env.store().is_in_flight(&id));

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_drains_buffered_jobs() {
    let mut env = TestEnv::builder().workers(1).queue_capacity(8).build();
    for i in 0..5 {
        env.deliver(event_body(&format!("drain-{i}"), "company.created")).unwrap();
    }

    env.start_workers().await.unwrap();
    let store = env.store();
    let processor = Arc::clone(&env.processor);

    env.shutdown().await.unwrap();

    assert_eq!(store.len(), 5);
    assert_eq!(processor.total_calls(), 5);
}

#[tokio::test]
async fn engine_cannot_start_twice() {
    let mut env = TestEnv::start().await;
    assert!(env.start_workers().await.is_err());
    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn retry_is_not_lost_while_ingress_keeps_queue_full() {
    let processor = ScriptedProcessor::new().with_latency(Duration::from_millis(2));
    processor.always("saturated", ProcessingOutcome::Transient("system_error".to_string()));
    let env = TestEnv::builder()
        .workers(1)
        .queue_capacity(1)
        .retry_policy(RetryPolicy::fixed(4, Duration::from_millis(1)))
        .processor(processor)
        .start()
        .await;

    env.deliver(event_body("saturated", "company.updated")).unwrap();

    let queue = env.queue();
    let ingress = tokio::spawn(async move {
        let mut next = 0u32;
        loop {
            let body = event_body(&format!("filler-{next}"), "company.created");
            if queue.enqueue(Job::new(body)).is_ok() {
                next += 1;
            }
            tokio::task::yield_now().await;
        }
    });

    let id = EventId::from("saturated");
    let committed = env
        .events
        .wait_until(WAIT_TIMEOUT, |events| {
            events.iter().any(|e| {
                matches!(e, ProcessingEvent::Committed { event_id, .. } if *event_id == id)
            })
        })
        .await;
    ingress.abort();

    assert!(committed);
    assert_eq!(env.events.commit_reason(&id), Some(CommitReason::DeadLettered));
    assert_eq!(env.processor.call_count("saturated"), 4);
    assert!(!env
        .events
        .events_for(&id)
        .iter()
        .any(|e| matches!(e, ProcessingEvent::RetryAbandoned { .. })));

    env.shutdown().await.unwrap();
}

#[derive(Debug)]
struct PanickingProcessor;

#[async_trait::async_trait]
impl EventProcessor for PanickingProcessor {
    async fn process(&self, _event: &WebhookEvent) -> ProcessingOutcome {
        panic!("processor bug");
    }
}

#[tokio::test]
async fn panicked_worker_is_no_longer_counted_active() {
    let config = EngineConfig { worker_count: 2, queue_capacity: 4, ..EngineConfig::default() };
    let mut engine = ProcessingEngine::new(config, Arc::new(PanickingProcessor)).unwrap();
    engine.start().await.unwrap();
    assert_eq!(engine.stats().await.active_workers, 2);

    engine.queue().enqueue(Job::new(event_body("panics", "company.updated"))).unwrap();

    tokio::time::timeout(Duration::from_secs(1), async {
        while engine.stats().await.active_workers != 1 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("panicked worker should stop being counted");

    assert!(matches!(engine.shutdown().await, Err(WorkerError::WorkerPanic { .. })));
}

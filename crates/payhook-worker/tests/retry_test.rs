//! Integration tests for the retry budget and dead-letter behavior.
//!
//! Uses the virtual clock so multi-second retry delays complete instantly
//! while still being recorded for assertions.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use payhook_core::{CommitReason, EventId, ProcessingEvent};
use payhook_testing::{event_body, ScriptedProcessor, TestEnv, WAIT_TIMEOUT};
use payhook_worker::{BackoffStrategy, ProcessingOutcome, RetryPolicy};

fn always_transient(id: &str) -> ScriptedProcessor {
    let processor = ScriptedProcessor::new();
    processor.always(id, ProcessingOutcome::Transient("server_error: upstream down".to_string()));
    processor
}

async fn wait_for_commit(env: &TestEnv, id: &EventId) -> bool {
    env.events
        .wait_until(WAIT_TIMEOUT, |events| {
            events.iter().any(|e| {
                matches!(e, ProcessingEvent::Committed { event_id, .. } if event_id == id)
            })
        })
        .await
}

#[tokio::test]
async fn always_transient_event_is_attempted_exactly_max_attempts_times() {
    let env = TestEnv::builder()
        .retry_policy(RetryPolicy::fixed(5, Duration::from_secs(10)))
        .processor(always_transient("transient-uuid"))
        .start()
        .await;
    let id = EventId::from("transient-uuid");

    env.deliver(event_body("transient-uuid", "company.updated")).unwrap();

    assert!(wait_for_commit(&env, &id).await);
    assert_eq!(env.processor.call_count("transient-uuid"), 5);
    assert_eq!(env.events.requeue_count(&id), 4);
    assert_eq!(env.events.commit_reason(&id), Some(CommitReason::DeadLettered));
    assert!(env.store().contains(&id));
    assert_eq!(env.clock.recorded_sleeps(), vec![Duration::from_secs(10); 4]);

    let stats = env.stats().await;
    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(stats.retries_scheduled, 4);

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn dead_lettered_event_is_never_retried_again() {
    let env = TestEnv::builder()
        .workers(1)
        .retry_policy(RetryPolicy::fixed(2, Duration::from_secs(1)))
        .processor(always_transient("exhausted"))
        .start()
        .await;
    let id = EventId::from("exhausted");

    env.deliver(event_body("exhausted", "company.updated")).unwrap();
    assert!(wait_for_commit(&env, &id).await);

    env.deliver(event_body("exhausted", "company.updated")).unwrap();
    assert!(env.wait_for_terminal_events(2).await);

    assert_eq!(env.processor.call_count("exhausted"), 2);
    assert_eq!(env.stats().await.duplicates, 1);

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn single_attempt_budget_dead_letters_immediately() {
    let env = TestEnv::builder()
        .retry_policy(RetryPolicy::fixed(1, Duration::from_secs(10)))
        .processor(always_transient("one-shot"))
        .start()
        .await;
    let id = EventId::from("one-shot");

    env.deliver(event_body("one-shot", "company.updated")).unwrap();

    assert!(wait_for_commit(&env, &id).await);
    assert_eq!(env.processor.call_count("one-shot"), 1);
    assert_eq!(env.events.requeue_count(&id), 0);
    assert!(env.clock.recorded_sleeps().is_empty());

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn exponential_backoff_doubles_retry_delays() {
    let policy = RetryPolicy {
        max_attempts: 4,
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(60),
        jitter_factor: 0.0,
        backoff_strategy: BackoffStrategy::Exponential,
    };
    let env = TestEnv::builder()
        .retry_policy(policy)
        .processor(always_transient("backoff"))
        .start()
        .await;

    env.deliver(event_body("backoff", "company.updated")).unwrap();

    assert!(wait_for_commit(&env, &EventId::from("backoff")).await);
    assert_eq!(
        env.clock.recorded_sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
    );

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn transient_failures_of_independent_events_do_not_block_each_other() {
    let processor = always_transient("slow-retry");
    let env = TestEnv::builder()
        .workers(1)
        .retry_policy(RetryPolicy::fixed(3, Duration::from_secs(30)))
        .processor(processor)
        .start()
        .await;

    env.deliver(event_body("slow-retry", "company.updated")).unwrap();
    env.deliver(event_body("fast-success", "company.created")).unwrap();

    assert!(env.wait_for_terminal("fast-success").await);
    assert!(wait_for_commit(&env, &EventId::from("slow-retry")).await);
    assert_eq!(env.store().len(), 2);

    env.shutdown().await.unwrap();
}

//! Recording event handler for observing asynchronous processing.

use std::{sync::Mutex, time::Duration};

use payhook_core::{CommitReason, EventHandler, EventId, ProcessingEvent};
use tokio::sync::Notify;

/// Event handler that stores every lifecycle event it receives.
#[derive(Debug, Default)]
pub struct RecordingEventHandler {
    events: Mutex<Vec<ProcessingEvent>>,
    notify: Notify,
}

impl RecordingEventHandler {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far.
    pub fn events(&self) -> Vec<ProcessingEvent> {
        self.events.lock().expect("events lock").clone()
    }

    /// Events that refer to `id`.
    pub fn events_for(&self, id: &EventId) -> Vec<ProcessingEvent> {
        self.events().into_iter().filter(|event| event.event_id() == Some(id)).collect()
    }

    /// Commit reason recorded for `id`, if any.
    pub fn commit_reason(&self, id: &EventId) -> Option<CommitReason> {
        self.events_for(id).into_iter().find_map(|event| match event {
            ProcessingEvent::Committed { reason, .. } => Some(reason),
            _ => None,
        })
    }

    /// Number of retries scheduled for `id`.
    pub fn requeue_count(&self, id: &EventId) -> usize {
        self.events_for(id)
            .iter()
            .filter(|event| matches!(event, ProcessingEvent::Requeued { .. }))
            .count()
    }

    /// Waits until `predicate` holds over the recorded events.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_until<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[ProcessingEvent]) -> bool,
    {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if predicate(&self.events()) {
                    return;
                }
                notified.await;
            }
        };

        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Waits until `count` terminal events have been recorded.
    pub async fn wait_for_terminal_events(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |events| {
            events.iter().filter(|event| event.is_terminal()).count() >= count
        })
        .await
    }

    /// Waits until `id` reaches a terminal event.
    pub async fn wait_for_terminal(&self, id: &EventId, timeout: Duration) -> bool {
        self.wait_until(timeout, |events| {
            events.iter().any(|event| event.event_id() == Some(id) && event.is_terminal())
        })
        .await
    }
}

#[async_trait::async_trait]
impl EventHandler for RecordingEventHandler {
    async fn handle_event(&self, event: ProcessingEvent) {
        self.events.lock().expect("events lock").push(event);
        self.notify.notify_waiters();
    }
}

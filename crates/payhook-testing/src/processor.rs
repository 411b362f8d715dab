//! Scripted event processor.
//!
//! Returns preconfigured outcomes per event identifier and records every
//! call, so tests can assert how many attempts an event received.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use payhook_core::{EventId, WebhookEvent};
use payhook_worker::{EventProcessor, ProcessingOutcome};

/// Processor that plays back scripted outcomes.
///
/// Each identifier has a sequence of outcomes; the last one repeats once the
/// sequence is exhausted. Unscripted identifiers succeed.
#[derive(Debug, Default)]
pub struct ScriptedProcessor {
    scripts: Mutex<HashMap<EventId, VecDeque<ProcessingOutcome>>>,
    calls: Mutex<Vec<EventId>>,
    latency: Option<Duration>,
}

impl ScriptedProcessor {
    /// Creates a processor where every event succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds artificial processing latency to every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Always returns `outcome` for `id`.
    pub fn always(&self, id: impl Into<EventId>, outcome: ProcessingOutcome) {
        self.script(id, vec![outcome]);
    }

    /// Returns `outcomes` in order for `id`, repeating the last.
    pub fn script(&self, id: impl Into<EventId>, outcomes: Vec<ProcessingOutcome>) {
        self.scripts.lock().expect("scripts lock").insert(id.into(), outcomes.into());
    }

    /// Number of times `id` was processed.
    pub fn call_count(&self, id: impl Into<EventId>) -> usize {
        let id = id.into();
        self.calls.lock().expect("calls lock").iter().filter(|call| **call == id).count()
    }

    /// Total number of processing calls.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    fn next_outcome(&self, id: &EventId) -> ProcessingOutcome {
        let mut scripts = self.scripts.lock().expect("scripts lock");
        match scripts.get_mut(id) {
            Some(outcomes) if outcomes.len() > 1 => {
                outcomes.pop_front().unwrap_or(ProcessingOutcome::Success)
            },
            Some(outcomes) => outcomes.front().cloned().unwrap_or(ProcessingOutcome::Success),
            None => ProcessingOutcome::Success,
        }
    }
}

#[async_trait::async_trait]
impl EventProcessor for ScriptedProcessor {
    async fn process(&self, event: &WebhookEvent) -> ProcessingOutcome {
        self.calls.lock().expect("calls lock").push(event.uuid.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.next_outcome(&event.uuid)
    }
}

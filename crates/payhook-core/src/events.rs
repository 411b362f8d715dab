//! Processing lifecycle events.
//!
//! Workers emit one event per job state transition. Observers subscribe
//! through [`EventHandler`] without the worker needing to know who listens,
//! which is how tests follow asynchronous progress that the
//! original HTTP caller never sees.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::EventId;

/// Why an event identifier was committed to the idempotency store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitReason {
    /// Processing succeeded.
    Success,
    /// Processing failed permanently.
    Permanent,
    /// Transient failures exhausted the retry budget.
    DeadLettered,
}

/// Why a job was dropped before processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Identifier already committed or currently in flight.
    Duplicate,
    /// Payload could not be parsed into an event.
    Unparseable,
}

/// Events emitted by the processing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcessingEvent {
    /// Identifier written to the idempotency store.
    Committed {
        /// Event that reached a terminal state
        event_id: EventId,
        /// Terminal outcome
        reason: CommitReason,
        /// Attempts made, including the final one
        attempts: u32,
        /// When the commit happened
        at: DateTime<Utc>,
    },

    /// Job handed to the retry scheduler after a transient failure.
    Requeued {
        /// Event being retried
        event_id: EventId,
        /// Attempt number the retry will run as (1-based)
        next_attempt: u32,
        /// Delay before re-enqueue
        delay: Duration,
    },

    /// Job dropped without invoking processing.
    Discarded {
        /// Event identifier, when the payload could be parsed
        event_id: Option<EventId>,
        /// Why the job was dropped
        reason: DiscardReason,
    },

    /// Unclassified failure; claim released so a redelivery is new work.
    Released {
        /// Event whose claim was released
        event_id: EventId,
        /// Failure description
        reason: String,
    },

    /// Scheduled retry cancelled or rejected before it reached the queue.
    RetryAbandoned {
        /// Event whose retry was abandoned
        event_id: EventId,
        /// Why the retry did not run
        reason: String,
    },
}

impl ProcessingEvent {
    /// Returns the event identifier this lifecycle event refers to, if known.
    pub fn event_id(&self) -> Option<&EventId> {
        match self {
            Self::Committed { event_id, .. }
            | Self::Requeued { event_id, .. }
            | Self::Released { event_id, .. }
            | Self::RetryAbandoned { event_id, .. } => Some(event_id),
            Self::Discarded { event_id, .. } => event_id.as_ref(),
        }
    }

    /// Whether this event ends the job's life.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Requeued { .. })
    }
}

/// Observer of processing lifecycle events.
///
/// Handlers must not block processing; failures inside a handler are the
/// handler's to log.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + std::fmt::Debug {
    /// Handles a processing event.
    async fn handle_event(&self, event: ProcessingEvent);
}

/// Event handler that discards all events.
#[derive(Debug, Default)]
pub struct NoOpEventHandler;

#[async_trait::async_trait]
impl EventHandler for NoOpEventHandler {
    async fn handle_event(&self, _event: ProcessingEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn released() -> ProcessingEvent {
        ProcessingEvent::Released { event_id: EventId::from("evt-1"), reason: "boom".to_string() }
    }

    #[tokio::test]
    async fn no_op_handler_accepts_events() {
        NoOpEventHandler.handle_event(released()).await;
    }

    #[test]
    fn requeue_is_the_only_non_terminal_event() {
        let requeued = ProcessingEvent::Requeued {
            event_id: EventId::from("evt-1"),
            next_attempt: 2,
            delay: Duration::from_secs(10),
        };
        let discarded =
            ProcessingEvent::Discarded { event_id: None, reason: DiscardReason::Unparseable };

        assert!(!requeued.is_terminal());
        assert!(released().is_terminal());
        assert!(discarded.is_terminal());
        assert_eq!(discarded.event_id(), None);
        assert_eq!(requeued.event_id(), Some(&EventId::from("evt-1")));
    }
}

//! Core domain types for the payhook webhook pipeline.
//!
//! Provides the event and job model, the error taxonomy shared by the
//! ingress boundary and the workers, lifecycle events, and the clock
//! abstraction used for retry timing.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use error::{PayhookError, Result};
pub use events::{CommitReason, DiscardReason, EventHandler, NoOpEventHandler, ProcessingEvent};
pub use models::{EventId, InboundPayload, Job, WebhookEvent};
pub use time::{Clock, RealClock, TestClock};

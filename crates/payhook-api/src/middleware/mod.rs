//! HTTP middleware for webhook authentication.
//!
//! Verifies body signatures before any handler runs and re-exposes the
//! buffered body to handlers as [`RawBody`].
pub mod signature;

pub use signature::{verify_signature, RawBody};

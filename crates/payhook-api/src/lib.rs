//! Payhook HTTP API.
//!
//! Signed webhook intake, subscription setup, health probes, and service
//! configuration. Accepted events are handed to the processing engine's
//! admission queue; everything after that is `payhook-worker`'s concern.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod crypto;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use config::{Config, LogFormat};
pub use crypto::{SignatureError, SignatureVerifier, Verified, SIGNATURE_HEADER};
pub use server::{create_router, shutdown_signal, start_server, AppState};

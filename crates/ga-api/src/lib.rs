//! ga-api: HTTP API for Gmail Analyzer
//!
//! Exposes sync, email listing and analytics endpoints.
//! Built with axum for async HTTP handling.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use server::{AppState, router, start_server};

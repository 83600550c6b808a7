//! Route definitions
//!
//! Defines all HTTP API endpoints.

use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers::{analytics, emails, health, sync};
use crate::server::AppState;

/// Create the API router
pub fn routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Mailbox sync
        .route("/api/sync", post(sync))
        // Listing and aggregation
        .route("/api/emails", get(emails))
        .route("/api/analytics", get(analytics))
}

//! HTTP API handlers
//!
//! Request handlers for sync, email listing and analytics.

use axum::{
    Json,
    extract::{Query, State},
};
use ga_core::query::{DEFAULT_PAGE_SIZE, parse_after_date};
use ga_core::{Analytics, EmailPage, EmailQuery, QueryEngine, SortBy, SyncEngine};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ApiError, Result};
use crate::server::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// `/api/emails` query string.
///
/// Kept as raw strings so malformed values produce a `{detail}` 400 instead
/// of the extractor's plain-text rejection.
#[derive(Debug, Default, Deserialize)]
pub struct EmailsParams {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub search: Option<String>,
    pub after_date: Option<String>,
    pub sort_by: Option<String>,
}

impl EmailsParams {
    pub fn into_query(self) -> Result<EmailQuery> {
        let page = parse_number("page", self.page.as_deref(), 1)?;
        let page_size = parse_number("page_size", self.page_size.as_deref(), DEFAULT_PAGE_SIZE)?;

        let sort_by = match non_empty(self.sort_by.as_deref()) {
            Some(raw) => raw.parse::<SortBy>().map_err(ApiError::from_query)?,
            None => SortBy::default(),
        };

        let mut query = EmailQuery::new(sort_by).with_page(page, page_size);
        if let Some(search) = non_empty(self.search.as_deref()) {
            query = query.with_search(search);
        }
        if let Some(raw) = non_empty(self.after_date.as_deref()) {
            query = query.with_after_date(parse_after_date(raw).map_err(ApiError::from_query)?);
        }

        query.validate().map_err(ApiError::from_query)?;
        Ok(query)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn parse_number(name: &str, raw: Option<&str>, default: u32) -> Result<u32> {
    match non_empty(raw) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("{} must be a positive integer", name))),
        None => Ok(default),
    }
}

/// Sync result payload
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub message: String,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub discarded: usize,
}

// ============================================================================
// Handler functions
// ============================================================================

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Pull new messages from the mail source into the store
pub async fn sync(State(state): State<AppState>) -> Result<Json<SyncResponse>> {
    info!("Sync requested");

    let source = state.source.open().await.map_err(ApiError::Sync)?;
    let report = SyncEngine::new(&state.store, &state.config.sync)
        .run(source.as_ref())
        .await
        .map_err(ApiError::Sync)?;

    Ok(Json(SyncResponse {
        message: report.message(),
        processed: report.processed,
        skipped: report.skipped,
        failed: report.failed,
        discarded: report.discarded,
    }))
}

/// Paginated listing in one of the three presentation modes
pub async fn emails(
    State(state): State<AppState>,
    Query(params): Query<EmailsParams>,
) -> Result<Json<EmailPage>> {
    debug!("Emails request: {:?}", params);

    let query = params.into_query()?;
    let page = QueryEngine::new(&state.store)
        .query(&query)
        .map_err(ApiError::from_query)?;

    Ok(Json(page))
}

/// Top senders and domains
pub async fn analytics(State(state): State<AppState>) -> Result<Json<Analytics>> {
    let analytics = QueryEngine::new(&state.store).analytics(state.config.analytics.top_n)?;
    Ok(Json(analytics))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> EmailsParams {
        let mut params = EmailsParams::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "page" => params.page = value,
                "page_size" => params.page_size = value,
                "search" => params.search = value,
                "after_date" => params.after_date = value,
                "sort_by" => params.sort_by = value,
                other => panic!("unknown param {}", other),
            }
        }
        params
    }

    #[test]
    fn test_defaults() {
        let query = EmailsParams::default().into_query().unwrap();
        assert_eq!(query, EmailQuery::default());
    }

    #[test]
    fn test_empty_values_are_absent() {
        let query = params(&[("search", ""), ("after_date", ""), ("sort_by", "")])
            .into_query()
            .unwrap();
        assert!(query.search.is_none());
        assert!(query.after_date.is_none());
        assert_eq!(query.sort_by, SortBy::SenderFrequency);
    }

    #[test]
    fn test_rejects_bad_values() {
        for pairs in [
            [("page", "0")],
            [("page", "abc")],
            [("page_size", "101")],
            [("page_size", "-5")],
            [("sort_by", "size")],
            [("after_date", "01/02/2023")],
        ] {
            let err = params(&pairs).into_query().unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)), "{:?}", pairs);
        }
    }

    #[test]
    fn test_after_date_message() {
        let err = params(&[("after_date", "not-a-date")]).into_query().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid date format. Use ISO format (YYYY-MM-DD)"
        );
    }
}

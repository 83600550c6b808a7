//! HTTP API Server
//!
//! Starts and manages the axum-based HTTP server.

use axum::Router;
use http::{HeaderValue, Method, header};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use ga_core::{Config, MailSourceProvider, RecordStore};

use crate::routes::routes;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<RecordStore>,
    pub source: Arc<dyn MailSourceProvider>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<RecordStore>, source: Arc<dyn MailSourceProvider>) -> Self {
        Self {
            config,
            store,
            source,
        }
    }
}

/// CORS を設定から構築する
///
/// `*` または空リストの場合は制限なし。
fn cors_layer(config: &Config) -> CorsLayer {
    if config.allows_any_origin() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .merge(routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let port = state.config.api.port;
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("HTTP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use chrono::DateTime;
    use ga_core::record::parse_record;
    use ga_core::{HeaderSet, MailSource, MessagePage};
    use serde_json::Value;
    use tower::ServiceExt;

    const MAILBOX: &[(&str, &str, &str)] = &[
        ("1", "\"Alice\" <alice@example.com>", "Wed, 1 Mar 2023 09:00:00 +0000"),
        ("2", "Alice <alice@example.com>", "Sat, 1 Apr 2023 09:00:00 +0000"),
        ("3", "Bob <bob@example.com>", "Fri, 30 Dec 2022 08:00:00 +0000"),
        ("4", "Carol <carol@other.org>", "Mon, 2 Jan 2023 10:00:00 -0800"),
        ("5", "news@shop.test", ""),
    ];

    fn headers(from: &str, date: &str) -> HeaderSet {
        let mut headers = HeaderSet::new().with("From", from).with("Subject", "hello");
        if !date.is_empty() {
            headers.push("Date", date);
        }
        headers
    }

    struct FakeSource;

    #[async_trait]
    impl MailSource for FakeSource {
        async fn list_messages(&self, _cursor: Option<&str>, _page_size: u32) -> ga_core::Result<MessagePage> {
            Ok(MessagePage::new(
                MAILBOX.iter().map(|(id, _, _)| id.to_string()).collect(),
                None,
            ))
        }

        async fn get_message_metadata(&self, id: &str, _headers: &[&str]) -> ga_core::Result<HeaderSet> {
            MAILBOX
                .iter()
                .find(|(i, _, _)| *i == id)
                .map(|(_, from, date)| headers(from, date))
                .ok_or_else(|| ga_core::Error::Source(format!("no message {}", id)))
        }
    }

    struct FakeProvider {
        fail: bool,
    }

    #[async_trait]
    impl MailSourceProvider for FakeProvider {
        async fn open(&self) -> ga_core::Result<Box<dyn MailSource>> {
            if self.fail {
                return Err(ga_core::Error::Source("token request failed (401)".to_string()));
            }
            Ok(Box::new(FakeSource))
        }
    }

    fn state(seeded: bool, fail: bool) -> AppState {
        let store = RecordStore::in_memory().unwrap();
        if seeded {
            let records: Vec<_> = MAILBOX
                .iter()
                .filter_map(|(id, from, date)| parse_record(id, &headers(from, date)))
                .collect();
            store.insert_batch(&records).unwrap();
        }
        AppState::new(Config::default(), Arc::new(store), Arc::new(FakeProvider { fail }))
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn get(state: AppState, uri: &str) -> (StatusCode, Value) {
        send(state, Request::get(uri).body(Body::empty()).unwrap()).await
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(state(false, false))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_sync_then_resync() {
        let state = state(false, false);

        let request = || Request::post("/api/sync").body(Body::empty()).unwrap();
        let (status, body) = send(state.clone(), request()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["message"],
            "Processed 5 new messages, skipped 0 existing messages"
        );
        assert_eq!(state.store.count().unwrap(), 5);

        let (_, body) = send(state, request()).await;
        assert_eq!(body["processed"], 0);
        assert_eq!(body["skipped"], 5);
    }

    #[tokio::test]
    async fn test_sync_failure_is_500_with_detail() {
        let (status, body) = send(
            state(false, true),
            Request::post("/api/sync").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("token request failed"));
    }

    #[tokio::test]
    async fn test_emails_date_mode() {
        let (status, body) = get(state(true, false), "/api/emails?sort_by=date&page=1&page_size=2").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 5);
        assert_eq!(body["page"], 1);
        assert_eq!(body["page_size"], 2);
        assert_eq!(body["sort_by"], "date");
        assert!(body.get("results").is_none());

        let emails = body["emails"].as_array().unwrap();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0]["id"], "2");
        assert_eq!(emails[0]["sender_count"], 2);
        assert_eq!(emails[0]["domain_count"], 3);
        assert_eq!(emails[0]["sender_domain"], "example.com");
    }

    #[tokio::test]
    async fn test_emails_default_is_sender_frequency() {
        let (status, body) = get(state(true, false), "/api/emails").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sort_by"], "sender_frequency");
        assert_eq!(body["total"], 4);

        let results = body["results"].as_array().unwrap();
        assert_eq!(results[0]["sender_email"], "alice@example.com");
        assert_eq!(results[0]["count"], 2);
        assert_eq!(results[0]["emails"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_emails_domain_frequency_after_date() {
        let (status, body) = get(
            state(true, false),
            "/api/emails?after_date=2023-01-01&sort_by=domain_frequency&page=1&page_size=10",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let groups = body["results"].as_array().unwrap();
        assert!(groups.len() <= 10);
        assert_eq!(groups[0]["sender_domain"], "example.com");
        assert_eq!(groups[0]["count"], 2);

        let bound = DateTime::parse_from_rfc3339("2023-01-01T00:00:00Z").unwrap();
        for group in groups {
            for email in group["emails"].as_array().unwrap() {
                let date = DateTime::parse_from_rfc3339(email["received_date"].as_str().unwrap()).unwrap();
                assert!(date >= bound);
            }
        }
    }

    #[tokio::test]
    async fn test_emails_bad_input_is_400() {
        for uri in [
            "/api/emails?after_date=yesterday",
            "/api/emails?page=0",
            "/api/emails?page_size=500",
            "/api/emails?page=two",
            "/api/emails?sort_by=size",
        ] {
            let (status, body) = get(state(true, false), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert!(body["detail"].is_string(), "{}", uri);
        }

        let (_, body) = get(state(true, false), "/api/emails?after_date=yesterday").await;
        assert_eq!(body["detail"], "Invalid date format. Use ISO format (YYYY-MM-DD)");
    }

    #[tokio::test]
    async fn test_analytics() {
        let (status, body) = get(state(true, false), "/api/analytics").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["top_senders"][0]["email"], "alice@example.com");
        assert_eq!(body["top_senders"][0]["name"], "Alice");
        assert_eq!(body["top_senders"][0]["count"], 2);
        assert_eq!(body["top_domains"][0]["domain"], "example.com");
        assert_eq!(body["top_domains"][0]["count"], 3);
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let request = Request::get("/health")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = router(state(false, false)).oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );

        let request = Request::get("/health")
            .header(header::ORIGIN, "http://evil.test")
            .body(Body::empty())
            .unwrap();
        let response = router(state(false, false)).oneshot(request).await.unwrap();
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}

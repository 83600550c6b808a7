//! Gmail REST client implementation

use async_trait::async_trait;
use ga_core::{GmailConfig, HeaderSet, MailSource, MailSourceProvider, MessagePage};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::auth::Authorization;
use crate::error::{GmailError, Result};
use crate::models::{MessageList, MessageMetadata};

/// Authenticated Gmail session for one sync run
pub struct GmailClient {
    http: Client,
    base_url: String,
    user_id: String,
    access_token: String,
}

impl GmailClient {
    pub fn new(
        http: Client,
        base_url: &str,
        user_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/users/{}/messages", self.base_url, self.user_id)
    }

    /// `users.messages.list`
    pub async fn list(&self, page_token: Option<&str>, max_results: u32) -> Result<MessageList> {
        let mut query = vec![("maxResults", max_results.to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        self.get_json(&self.messages_url(), &query).await
    }

    /// `users.messages.get` with `format=metadata`
    pub async fn metadata(&self, id: &str, headers: &[&str]) -> Result<MessageMetadata> {
        let mut query = vec![("format", "metadata".to_string())];
        query.extend(headers.iter().map(|h| ("metadataHeaders", h.to_string())));

        self.get_json(&format!("{}/{}", self.messages_url(), id), &query)
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!("Gmail request failed: {} - {}", status, body);
            return Err(GmailError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl MailSource for GmailClient {
    async fn list_messages(
        &self,
        cursor: Option<&str>,
        page_size: u32,
    ) -> ga_core::Result<MessagePage> {
        let list = self.list(cursor, page_size).await?;
        debug!(
            "Listed {} messages (estimate {})",
            list.messages.len(),
            list.result_size_estimate
        );

        Ok(MessagePage::new(
            list.messages.into_iter().map(|m| m.id).collect(),
            list.next_page_token,
        ))
    }

    async fn get_message_metadata(&self, id: &str, headers: &[&str]) -> ga_core::Result<HeaderSet> {
        Ok(self.metadata(id, headers).await?.into_header_set())
    }
}

/// Opens a [`GmailClient`] with fresh credentials for each sync
pub struct GmailProvider {
    config: GmailConfig,
    http: Client,
}

impl GmailProvider {
    pub fn new(config: GmailConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("gmail-analyzer/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { config, http })
    }
}

#[async_trait]
impl MailSourceProvider for GmailProvider {
    async fn open(&self) -> ga_core::Result<Box<dyn MailSource>> {
        let auth = Authorization::from_config(&self.config)?;
        let token = auth.access_token(&self.http, &self.config.token_url).await?;

        info!("Gmail session opened for user {}", self.config.user_id);
        Ok(Box::new(GmailClient::new(
            self.http.clone(),
            &self.config.base_url,
            self.config.user_id.clone(),
            token,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ga_core::{RecordStore, SyncConfig, SyncEngine};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GmailClient {
        GmailClient::new(Client::new(), &server.uri(), "me", "tok")
    }

    fn metadata_body(id: &str, from: &str) -> serde_json::Value {
        json!({
            "id": id,
            "payload": {
                "headers": [
                    {"name": "From", "value": from},
                    {"name": "Subject", "value": format!("subject {}", id)},
                    {"name": "Date", "value": "Mon, 2 Jan 2023 10:00:00 -0800"}
                ]
            }
        })
    }

    #[tokio::test]
    async fn test_list_messages_sends_page_token_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .and(query_param("maxResults", "500"))
            .and(query_param("pageToken", "p2"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "a", "threadId": "a"}, {"id": "b", "threadId": "a"}],
                "resultSizeEstimate": 2
            })))
            .mount(&server)
            .await;

        let page = client(&server).list_messages(Some("p2"), 500).await.unwrap();
        assert_eq!(page.ids, vec!["a", "b"]);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_get_metadata_requests_only_named_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages/a"))
            .and(query_param("format", "metadata"))
            .and(query_param("metadataHeaders", "Subject"))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata_body("a", "jane@example.com")))
            .mount(&server)
            .await;

        let headers = client(&server)
            .get_message_metadata("a", &["From", "Subject", "Date"])
            .await
            .unwrap();
        assert_eq!(headers.get("From"), Some("jane@example.com"));
        assert_eq!(headers.get("Subject"), Some("subject a"));
    }

    #[tokio::test]
    async fn test_api_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid Credentials"))
            .mount(&server)
            .await;

        let err = client(&server).list(None, 10).await.unwrap_err();
        match err {
            GmailError::Api { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "Invalid Credentials");
            }
            other => panic!("expected api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_provider_sync_end_to_end() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("client_id=cid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        // 2 ページ目 (pageToken あり) を先に登録
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .and(query_param("pageToken", "next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "c", "threadId": "c"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "a", "threadId": "a"}, {"id": "b", "threadId": "b"}],
                "nextPageToken": "next"
            })))
            .mount(&server)
            .await;

        for (id, from) in [
            ("a", "\"Jane Doe\" <jane@example.com>"),
            ("b", "bob@example.org"),
            ("c", "Jane <jane@example.com>"),
        ] {
            Mock::given(method("GET"))
                .and(path(format!("/users/me/messages/{}", id)))
                .respond_with(ResponseTemplate::new(200).set_body_json(metadata_body(id, from)))
                .mount(&server)
                .await;
        }

        let provider = GmailProvider::new(GmailConfig {
            base_url: server.uri(),
            token_url: format!("{}/token", server.uri()),
            client_id: Some("cid".to_string()),
            client_secret: Some("secret".to_string()),
            refresh_token: Some("refresh".to_string()),
            credentials_file: "/nonexistent/credentials.json".to_string(),
            ..GmailConfig::default()
        })
        .unwrap();

        let store = RecordStore::in_memory().unwrap();
        let source = provider.open().await.unwrap();
        let report = SyncEngine::new(&store, &SyncConfig::default())
            .run(source.as_ref())
            .await
            .unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.pages, 2);
        let jane = store.get("a").unwrap().unwrap();
        assert_eq!(jane.sender_name, "Jane Doe");
        assert_eq!(jane.sender_domain, "example.com");
    }
}

//! Gmail API wire types

use ga_core::HeaderSet;
use serde::Deserialize;

/// `users.messages.list` response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    /// Omitted entirely for an empty mailbox
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub result_size_estimate: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
}

/// `users.messages.get` response with `format=metadata`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    pub id: String,
    #[serde(default)]
    pub payload: Option<MessagePayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl MessageMetadata {
    pub fn into_header_set(self) -> HeaderSet {
        self.payload
            .map(|p| p.headers)
            .unwrap_or_default()
            .into_iter()
            .map(|h| (h.name, h.value))
            .collect()
    }
}

/// OAuth token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: String,
}

/// OAuth error body (`{"error": "...", "error_description": "..."}`)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenError {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

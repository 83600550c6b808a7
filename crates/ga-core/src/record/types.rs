//! Record types

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Headers requested from the mail provider for every message
pub const METADATA_HEADERS: [&str; 3] = ["From", "Subject", "Date"];

/// A normalized email metadata entry, keyed by the provider's message id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Provider-assigned message identifier
    pub id: String,
    /// Display name from the From header (may be empty)
    pub sender_name: String,
    /// Address from the From header
    pub sender_email: String,
    /// Part of `sender_email` after the last `@`
    pub sender_domain: String,
    /// Subject header, verbatim
    pub subject: Option<String>,
    /// Parsed Date header, keeping the sender's UTC offset
    pub received_date: Option<DateTime<FixedOffset>>,
}

/// Raw header name/value pairs as returned by the mail provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSet {
    headers: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, keeping provider order
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// First value for `name`, compared case-insensitively
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            headers: iter
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let headers = HeaderSet::new()
            .with("from", "a@example.com")
            .with("SUBJECT", "Hello");

        assert_eq!(headers.get("From"), Some("a@example.com"));
        assert_eq!(headers.get("Subject"), Some("Hello"));
        assert_eq!(headers.get("Date"), None);
    }

    #[test]
    fn test_first_header_wins() {
        let headers: HeaderSet = [("Subject", "first"), ("Subject", "second")]
            .into_iter()
            .collect();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("subject"), Some("first"));
    }
}

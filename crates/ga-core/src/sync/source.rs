//! Mail source traits

use async_trait::async_trait;

use crate::Result;
use crate::record::HeaderSet;

/// One page of message ids from a listing call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<String>,
    /// Continuation token; `None` when the listing is exhausted
    pub next_cursor: Option<String>,
}

impl MessagePage {
    pub fn new(ids: Vec<String>, next_cursor: Option<String>) -> Self {
        Self { ids, next_cursor }
    }
}

/// A remote mailbox that can be listed page by page
#[async_trait]
pub trait MailSource: Send + Sync {
    /// List message ids starting at `cursor` (`None` for the first page)
    async fn list_messages(&self, cursor: Option<&str>, page_size: u32) -> Result<MessagePage>;

    /// Fetch only the named headers of one message
    async fn get_message_metadata(&self, id: &str, headers: &[&str]) -> Result<HeaderSet>;
}

/// Opens an authenticated [`MailSource`] for a single sync invocation.
///
/// The returned handle owns its credentials and is dropped when the run ends.
#[async_trait]
pub trait MailSourceProvider: Send + Sync {
    async fn open(&self) -> Result<Box<dyn MailSource>>;
}

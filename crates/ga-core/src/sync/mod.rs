//! Incremental mail synchronization
//!
//! [`MailSource`] abstracts the remote mailbox; [`SyncEngine`] walks it page
//! by page and persists records whose ids are not stored yet.

mod engine;
mod source;

pub use engine::{SyncEngine, SyncReport};
pub use source::{MailSource, MailSourceProvider, MessagePage};

//! ga-core: Gmail Analyzer Core Library
//!
//! メールメタデータの正規化、SQLite ストア、同期エンジン、
//! 集計・クエリエンジンのコア機能を提供します。

pub mod config;
pub mod error;
pub mod query;
pub mod record;
pub mod store;
pub mod sync;

pub use config::{AnalyticsConfig, ApiConfig, Config, GmailConfig, StoreConfig, SyncConfig};
pub use error::{Error, Result};
pub use query::{Analytics, EmailPage, EmailQuery, QueryEngine, SortBy};
pub use record::{EmailRecord, HeaderSet};
pub use store::RecordStore;
pub use sync::{MailSource, MailSourceProvider, MessagePage, SyncEngine, SyncReport};

//! ga-gmail: Gmail REST adapter
//!
//! Gmail API (v1) のメッセージ一覧とメタデータ取得を
//! [`ga_core::MailSource`] として提供します。

pub mod auth;
pub mod client;
pub mod error;
pub mod models;

pub use auth::{Authorization, Credentials};
pub use client::{GmailClient, GmailProvider};
pub use error::{GmailError, Result};

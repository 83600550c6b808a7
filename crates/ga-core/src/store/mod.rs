//! Record store for ga-core
//!
//! This module provides persistent storage for email metadata records
//! using SQLite as the backend.

mod sqlite;

pub use sqlite::RecordStore;

//! Email metadata records
//!
//! The normalized record type and the header parser that produces it
//! from a provider's raw From/Subject/Date header set.

pub mod parser;
mod types;

pub use parser::{parse_date, parse_record, parse_sender, sender_domain_of};
pub use types::{EmailRecord, HeaderSet, METADATA_HEADERS};

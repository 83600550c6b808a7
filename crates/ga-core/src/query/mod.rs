//! Aggregation & query engine
//!
//! Filtering, three presentation modes (chronological, grouped by sender,
//! grouped by domain), pagination, and top-N analytics over the record store.

mod engine;
mod types;

pub use engine::{QueryEngine, RecordFilter};
pub use types::{
    Analytics, AnnotatedEmail, DEFAULT_PAGE_SIZE, DomainGroup, DomainStats, EmailPage, EmailQuery,
    GroupList, MAX_PAGE_SIZE, PageBody, SenderGroup, SenderStats, SortBy, parse_after_date,
};

//! Query parameters and result shapes

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::record::EmailRecord;
use crate::{Error, Result};

/// Largest accepted `page_size`
pub const MAX_PAGE_SIZE: u32 = 100;

/// `page_size` used when the caller gives none
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Presentation mode for `/api/emails`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Flat list, newest first
    Date,
    /// Grouped by sender address, largest group first
    #[default]
    SenderFrequency,
    /// Grouped by sender domain, largest group first
    DomainFrequency,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::SenderFrequency => "sender_frequency",
            Self::DomainFrequency => "domain_frequency",
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "date" => Ok(Self::Date),
            "sender_frequency" => Ok(Self::SenderFrequency),
            "domain_frequency" => Ok(Self::DomainFrequency),
            other => Err(Error::InvalidQuery(format!(
                "Invalid sort_by '{}'. Use date, sender_frequency or domain_frequency",
                other
            ))),
        }
    }
}

/// Parameters of one email listing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailQuery {
    /// 1-based page number
    pub page: u32,
    /// Entries (records or groups) per page, 1..=100
    pub page_size: u32,
    /// Case-insensitive substring matched against sender email, name and subject
    pub search: Option<String>,
    /// Inclusive lower bound on the received date
    pub after_date: Option<DateTime<FixedOffset>>,
    pub sort_by: SortBy,
}

impl Default for EmailQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            search: None,
            after_date: None,
            sort_by: SortBy::default(),
        }
    }
}

impl EmailQuery {
    pub fn new(sort_by: SortBy) -> Self {
        Self {
            sort_by,
            ..Self::default()
        }
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_after_date(mut self, after_date: DateTime<FixedOffset>) -> Self {
        self.after_date = Some(after_date);
        self
    }

    /// Reject out-of-range pagination before any query runs
    pub fn validate(&self) -> Result<()> {
        if self.page < 1 {
            return Err(Error::InvalidQuery("page must be at least 1".to_string()));
        }
        if self.page_size < 1 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::InvalidQuery(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }

    /// Number of entries before this page
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.page_size as usize)
    }
}

/// Parse an `after_date` value.
///
/// Accepts RFC 3339, a naive date-time (`T` or space separated) or a plain
/// `YYYY-MM-DD` date. Naive values are taken as UTC.
pub fn parse_after_date(raw: &str) -> Result<DateTime<FixedOffset>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt);
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc().fixed_offset());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| date.and_time(chrono::NaiveTime::MIN).and_utc().fixed_offset())
        .map_err(|_| {
            Error::InvalidQuery("Invalid date format. Use ISO format (YYYY-MM-DD)".to_string())
        })
}

/// A record in the chronological listing, with the size of its sender's
/// and domain's groups within the same filtered set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedEmail {
    #[serde(flatten)]
    pub record: EmailRecord,
    pub sender_count: usize,
    pub domain_count: usize,
}

/// Records sharing a sender address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderGroup {
    pub sender_email: String,
    /// Name from the group's most recent record
    pub sender_name: String,
    pub count: usize,
    pub latest_date: Option<DateTime<FixedOffset>>,
    /// Every matching record of the group, newest first
    pub emails: Vec<EmailRecord>,
}

/// Records sharing a sender domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainGroup {
    pub sender_domain: String,
    pub count: usize,
    pub latest_date: Option<DateTime<FixedOffset>>,
    pub emails: Vec<EmailRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GroupList {
    Senders(Vec<SenderGroup>),
    Domains(Vec<DomainGroup>),
}

impl GroupList {
    pub fn len(&self) -> usize {
        match self {
            Self::Senders(groups) => groups.len(),
            Self::Domains(groups) => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Page contents: flat records for `date`, groups otherwise
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageBody {
    Emails(Vec<AnnotatedEmail>),
    Results(GroupList),
}

impl PageBody {
    pub fn len(&self) -> usize {
        match self {
            Self::Emails(emails) => emails.len(),
            Self::Results(groups) => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One page of `/api/emails`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailPage {
    /// Matching records (date) or groups (frequency modes) across all pages
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
    pub sort_by: SortBy,
    #[serde(flatten)]
    pub body: PageBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderStats {
    pub email: String,
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainStats {
    pub domain: String,
    pub count: usize,
}

/// Top senders and domains over the whole store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analytics {
    pub top_senders: Vec<SenderStats>,
    pub top_domains: Vec<DomainStats>,
}

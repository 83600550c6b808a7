//! Query engine implementation

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use super::types::{
    Analytics, AnnotatedEmail, DomainGroup, EmailPage, EmailQuery, GroupList, PageBody,
    SenderGroup, SortBy,
};
use crate::record::EmailRecord;
use crate::store::RecordStore;
use crate::Result;

/// Case-insensitive substring filter over sender email, sender name and subject
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    needle: Option<String>,
}

impl RecordFilter {
    pub fn new(search: Option<&str>) -> Self {
        Self {
            needle: search
                .filter(|s| !s.is_empty())
                .map(|s| s.to_lowercase()),
        }
    }

    pub fn matches(&self, record: &EmailRecord) -> bool {
        let Some(needle) = &self.needle else {
            return true;
        };

        record.sender_email.to_lowercase().contains(needle)
            || record.sender_name.to_lowercase().contains(needle)
            || record
                .subject
                .as_deref()
                .is_some_and(|s| s.to_lowercase().contains(needle))
    }
}

/// Answers listing and analytics requests from the record store
pub struct QueryEngine<'a> {
    store: &'a RecordStore,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self { store }
    }

    /// Run a listing query.
    ///
    /// Filters apply first; `total` counts every matching record (date mode)
    /// or group (frequency modes), independent of the requested page.
    pub fn query(&self, query: &EmailQuery) -> Result<EmailPage> {
        query.validate()?;

        let filter = RecordFilter::new(query.search.as_deref());
        let records: Vec<EmailRecord> = self
            .store
            .load(query.after_date)?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();

        debug!(
            "Query sort_by={} page={} page_size={} matched {} records",
            query.sort_by,
            query.page,
            query.page_size,
            records.len()
        );

        let offset = query.offset();
        let limit = query.page_size as usize;

        let (total, body) = match query.sort_by {
            SortBy::Date => {
                let total = records.len();
                let emails = annotate(records)
                    .into_iter()
                    .skip(offset)
                    .take(limit)
                    .collect();
                (total, PageBody::Emails(emails))
            }
            SortBy::SenderFrequency => {
                let groups = sender_groups(records);
                let total = groups.len();
                let page = groups.into_iter().skip(offset).take(limit).collect();
                (total, PageBody::Results(GroupList::Senders(page)))
            }
            SortBy::DomainFrequency => {
                let groups = domain_groups(records);
                let total = groups.len();
                let page = groups.into_iter().skip(offset).take(limit).collect();
                (total, PageBody::Results(GroupList::Domains(page)))
            }
        };

        Ok(EmailPage {
            total,
            page: query.page,
            page_size: query.page_size,
            sort_by: query.sort_by,
            body,
        })
    }

    /// Top `top_n` senders and domains over every stored record.
    ///
    /// Aggregated in SQL; the ordering matches the frequency modes.
    pub fn analytics(&self, top_n: usize) -> Result<Analytics> {
        Ok(Analytics {
            top_senders: self.store.top_senders(top_n)?,
            top_domains: self.store.top_domains(top_n)?,
        })
    }
}

/// Attach per-sender and per-domain counts taken over the same record set
fn annotate(records: Vec<EmailRecord>) -> Vec<AnnotatedEmail> {
    let mut by_sender: HashMap<String, usize> = HashMap::new();
    let mut by_domain: HashMap<String, usize> = HashMap::new();
    for record in &records {
        *by_sender.entry(record.sender_email.clone()).or_default() += 1;
        *by_domain.entry(record.sender_domain.clone()).or_default() += 1;
    }

    records
        .into_iter()
        .map(|record| AnnotatedEmail {
            sender_count: by_sender.get(&record.sender_email).copied().unwrap_or_default(),
            domain_count: by_domain.get(&record.sender_domain).copied().unwrap_or_default(),
            record,
        })
        .collect()
}

struct Bucket {
    key: String,
    records: Vec<EmailRecord>,
}

impl Bucket {
    /// Records keep store order (newest first), so the head is the latest
    fn latest_date(&self) -> Option<DateTime<FixedOffset>> {
        self.records.first().and_then(|r| r.received_date)
    }
}

/// Group records by key, ordered by size descending, then latest date
/// descending (undated last), then key ascending
fn group_by<F>(records: Vec<EmailRecord>, key_of: F) -> Vec<Bucket>
where
    F: Fn(&EmailRecord) -> &str,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<Bucket> = Vec::new();

    for record in records {
        let key = key_of(&record);
        match index.get(key) {
            Some(&i) => buckets[i].records.push(record),
            None => {
                index.insert(key.to_string(), buckets.len());
                buckets.push(Bucket {
                    key: key.to_string(),
                    records: vec![record],
                });
            }
        }
    }

    buckets.sort_by(|a, b| {
        b.records
            .len()
            .cmp(&a.records.len())
            .then_with(|| newest_first(a.latest_date(), b.latest_date()))
            .then_with(|| a.key.cmp(&b.key))
    });
    buckets
}

fn newest_first(a: Option<DateTime<FixedOffset>>, b: Option<DateTime<FixedOffset>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn sender_groups(records: Vec<EmailRecord>) -> Vec<SenderGroup> {
    group_by(records, |r| r.sender_email.as_str())
        .into_iter()
        .map(|bucket| SenderGroup {
            sender_name: bucket
                .records
                .first()
                .map(|r| r.sender_name.clone())
                .unwrap_or_default(),
            count: bucket.records.len(),
            latest_date: bucket.latest_date(),
            sender_email: bucket.key,
            emails: bucket.records,
        })
        .collect()
}

fn domain_groups(records: Vec<EmailRecord>) -> Vec<DomainGroup> {
    group_by(records, |r| r.sender_domain.as_str())
        .into_iter()
        .map(|bucket| DomainGroup {
            count: bucket.records.len(),
            latest_date: bucket.latest_date(),
            sender_domain: bucket.key,
            emails: bucket.records,
        })
        .collect()
}

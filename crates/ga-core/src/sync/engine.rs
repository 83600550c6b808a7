//! Sync engine implementation

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::source::MailSource;
use crate::config::SyncConfig;
use crate::record::{EmailRecord, METADATA_HEADERS, parse_record};
use crate::store::RecordStore;
use crate::Result;

/// Counters for one sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Rows this run actually wrote to the store
    pub processed: usize,
    /// Ids that were already stored (or already seen in this run)
    pub skipped: usize,
    /// Messages whose metadata fetch failed
    pub failed: usize,
    /// Messages without a From header
    pub discarded: usize,
    /// Listing pages walked
    pub pages: usize,
}

impl SyncReport {
    pub fn message(&self) -> String {
        format!(
            "Processed {} new messages, skipped {} existing messages",
            self.processed, self.skipped
        )
    }
}

/// Walks a [`MailSource`] and stores every message not yet present.
///
/// Staged records are committed every `flush_every` insertions and at the end
/// of each page. Each commit is one transaction, so dropping the `run` future
/// leaves the store at the last committed batch.
pub struct SyncEngine<'a> {
    store: &'a RecordStore,
    page_size: u32,
    flush_every: usize,
}

impl<'a> SyncEngine<'a> {
    pub fn new(store: &'a RecordStore, config: &SyncConfig) -> Self {
        Self {
            store,
            page_size: config.page_size,
            flush_every: config.flush_every.max(1),
        }
    }

    /// Run until the listing is exhausted.
    ///
    /// Per-message fetch errors are logged and counted. A listing error or a
    /// failed flush aborts the run.
    pub async fn run(&self, source: &dyn MailSource) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut cursor: Option<String> = None;
        let mut staged: Vec<EmailRecord> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            let page = source
                .list_messages(cursor.as_deref(), self.page_size)
                .await?;
            report.pages += 1;
            debug!("Listed page {} with {} ids", report.pages, page.ids.len());

            for id in page.ids {
                if seen.contains(&id) || self.store.contains(&id)? {
                    report.skipped += 1;
                    continue;
                }

                let headers = match source.get_message_metadata(&id, &METADATA_HEADERS).await {
                    Ok(headers) => headers,
                    Err(e) => {
                        warn!("Error processing message {}: {}", id, e);
                        report.failed += 1;
                        continue;
                    }
                };

                match parse_record(&id, &headers) {
                    Some(record) => {
                        seen.insert(id);
                        staged.push(record);

                        if staged.len() >= self.flush_every {
                            report.processed += self.flush(&mut staged)?;
                        }
                    }
                    None => {
                        warn!("Discarding message {} without From header", id);
                        report.discarded += 1;
                    }
                }
            }

            // ページ終端では必ずコミット
            report.processed += self.flush(&mut staged)?;

            cursor = page.next_cursor.filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        info!(
            "Sync finished: processed={} skipped={} failed={} discarded={} pages={}",
            report.processed, report.skipped, report.failed, report.discarded, report.pages
        );
        Ok(report)
    }

    /// Commit staged records, returning the rows actually written
    fn flush(&self, staged: &mut Vec<EmailRecord>) -> Result<usize> {
        if staged.is_empty() {
            return Ok(0);
        }
        let written = self.store.insert_batch(staged)?;
        info!("Flushed {} records", written);
        staged.clear();
        Ok(written)
    }
}

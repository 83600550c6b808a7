//! Record storage implementation using SQLite

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, FixedOffset};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::query::{DomainStats, SenderStats};
use crate::record::EmailRecord;
use crate::{Error, Result};

const SELECT_COLUMNS: &str =
    "SELECT id, sender_name, sender_email, sender_domain, subject, received_date FROM email_messages";

/// SQLite-based storage for email metadata records
///
/// Rows are insert-only: an id that is already present is never replaced.
/// The connection sits behind a mutex so the store can be shared between
/// the HTTP handlers and a running sync.
pub struct RecordStore {
    conn: Mutex<Connection>,
}

impl RecordStore {
    /// Open (or create) the store at the given database path
    pub fn new(db_path: &str) -> Result<Self> {
        debug!("Opening record database at: {}", db_path);
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        info!("RecordStore initialized at {}", db_path);
        Ok(store)
    }

    /// Create an in-memory RecordStore (useful for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("record store lock poisoned".to_string()))
    }

    /// Initialize database tables
    fn init_tables(&self) -> Result<()> {
        self.conn()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS email_messages (
                id TEXT PRIMARY KEY,
                sender_name TEXT NOT NULL,
                sender_email TEXT NOT NULL,
                sender_domain TEXT NOT NULL,
                subject TEXT,
                received_date TEXT,
                received_ts INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_email_messages_received_ts
                ON email_messages(received_ts);
            CREATE INDEX IF NOT EXISTS idx_email_messages_sender_email
                ON email_messages(sender_email);
            CREATE INDEX IF NOT EXISTS idx_email_messages_sender_domain
                ON email_messages(sender_domain);",
        )?;
        Ok(())
    }

    /// Whether a record with this id is already stored
    pub fn contains(&self, id: &str) -> Result<bool> {
        let found = self
            .conn()?
            .query_row(
                "SELECT 1 FROM email_messages WHERE id = ?1",
                params![id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a batch of records in one transaction.
    ///
    /// Ids that already exist are left untouched. Returns the number of
    /// rows actually written.
    pub fn insert_batch(&self, records: &[EmailRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO email_messages
                 (id, sender_name, sender_email, sender_domain, subject, received_date, received_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for record in records {
                inserted += stmt.execute(params![
                    record.id,
                    record.sender_name,
                    record.sender_email,
                    record.sender_domain,
                    record.subject,
                    record.received_date.map(|dt| dt.to_rfc3339()),
                    record.received_date.map(|dt| dt.timestamp()),
                ])?;
            }
        }
        tx.commit()?;

        debug!("Committed {} of {} staged records", inserted, records.len());
        Ok(inserted)
    }

    /// Load a record by id
    pub fn get(&self, id: &str) -> Result<Option<EmailRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", SELECT_COLUMNS))?;
        let record = stmt.query_row(params![id], row_to_record).optional()?;
        Ok(record)
    }

    /// Load records received at or after `after`, or every record when
    /// `after` is `None`.
    ///
    /// Ordered by received date descending with undated records last,
    /// ties broken by id. Undated records never satisfy a date bound.
    pub fn load(&self, after: Option<DateTime<FixedOffset>>) -> Result<Vec<EmailRecord>> {
        let conn = self.conn()?;
        let order = "ORDER BY received_ts IS NULL, received_ts DESC, id ASC";

        let records = match after {
            Some(after) => {
                // 小数秒の境界は切り上げ
                let bound = after.timestamp() + i64::from(after.timestamp_subsec_nanos() > 0);
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE received_ts >= ?1 {}",
                    SELECT_COLUMNS, order
                ))?;
                let rows = stmt
                    .query_map(params![bound], row_to_record)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!("{} {}", SELECT_COLUMNS, order))?;
                let rows = stmt
                    .query_map([], row_to_record)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };

        debug!("Loaded {} records", records.len());
        Ok(records)
    }

    /// Count total records
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM email_messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Most frequent senders.
    ///
    /// Ordered by count descending, then latest received date descending
    /// (undated last), then address. The name is taken from the sender's
    /// most recent record.
    pub fn top_senders(&self, limit: usize) -> Result<Vec<SenderStats>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT g.sender_email, g.n,
                    (SELECT m.sender_name FROM email_messages m
                     WHERE m.sender_email = g.sender_email
                     ORDER BY m.received_ts IS NULL, m.received_ts DESC, m.id ASC
                     LIMIT 1)
             FROM (SELECT sender_email, COUNT(*) AS n, MAX(received_ts) AS latest
                   FROM email_messages GROUP BY sender_email) g
             ORDER BY g.n DESC, g.latest IS NULL, g.latest DESC, g.sender_email ASC
             LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(SenderStats {
                    email: row.get(0)?,
                    count: row.get::<_, i64>(1)? as usize,
                    name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Most frequent sender domains, with the same ordering as
    /// [`RecordStore::top_senders`]
    pub fn top_domains(&self, limit: usize) -> Result<Vec<DomainStats>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT sender_domain, COUNT(*) AS n, MAX(received_ts) AS latest
             FROM email_messages
             GROUP BY sender_domain
             ORDER BY n DESC, latest IS NULL, latest DESC, sender_domain ASC
             LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(DomainStats {
                    domain: row.get(0)?,
                    count: row.get::<_, i64>(1)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<EmailRecord> {
    let received_date = row
        .get::<_, Option<String>>(5)?
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))
        })
        .transpose()?;

    Ok(EmailRecord {
        id: row.get(0)?,
        sender_name: row.get(1)?,
        sender_email: row.get(2)?,
        sender_domain: row.get(3)?,
        subject: row.get(4)?,
        received_date,
    })
}

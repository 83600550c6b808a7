//! Header parser
//!
//! Maps a raw From/Subject/Date header set to an [`EmailRecord`].
//! The From header is the only mandatory field; everything else
//! degrades to an absent value.

use chrono::{DateTime, FixedOffset};
use tracing::{debug, warn};

use super::types::{EmailRecord, HeaderSet};

/// Build a record from a message's metadata headers.
///
/// Returns `None` when the From header is missing.
pub fn parse_record(id: &str, headers: &HeaderSet) -> Option<EmailRecord> {
    let Some(from) = headers.get("From") else {
        debug!("Message {} has no From header", id);
        return None;
    };

    let (sender_name, sender_email) = parse_sender(from);
    let sender_domain = sender_domain_of(&sender_email).to_string();

    let received_date = headers.get("Date").and_then(|raw| {
        let parsed = parse_date(raw);
        if parsed.is_none() {
            warn!("Error parsing date for message {}: {:?}", id, raw);
        }
        parsed
    });

    Some(EmailRecord {
        id: id.to_string(),
        sender_name,
        sender_email,
        sender_domain,
        subject: headers.get("Subject").map(str::to_string),
        received_date,
    })
}

/// Split a From value into `(sender_name, sender_email)`.
///
/// The name is everything before the first `<`, trimmed, with one layer of
/// double quotes removed. The address is everything after the last `<`
/// without the closing `>`. Without angle brackets both come from the
/// whole value.
pub fn parse_sender(from: &str) -> (String, String) {
    let name_part = from.split('<').next().unwrap_or_default().trim();
    let name_part = name_part.strip_prefix('"').unwrap_or(name_part);
    let name_part = name_part.strip_suffix('"').unwrap_or(name_part);

    let email_part = from.rsplit('<').next().unwrap_or_default().trim();
    let email_part = email_part.trim_end_matches('>').trim();

    (name_part.to_string(), email_part.to_string())
}

/// Domain of an address: the text after the last `@`, or the whole
/// address when it has none.
pub fn sender_domain_of(email: &str) -> &str {
    email.rsplit('@').next().unwrap_or(email)
}

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Permissive Date header parsing.
///
/// Folded whitespace is collapsed and a trailing comment such as `(PST)` is
/// dropped before RFC 2822 parsing. A day-of-week that disagrees with the
/// date is ignored. Values chrono still rejects are handed to the lenient
/// `mailparse` parser, whose result is expressed in UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let normalized = normalize_date(raw);
    if normalized.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(&normalized) {
        return Some(dt);
    }

    let without_weekday = strip_weekday(&normalized);
    if let Ok(dt) = DateTime::parse_from_rfc2822(without_weekday) {
        return Some(dt);
    }

    // mailparse は日付でない入力にも Ok(0) を返す
    if !has_month_name(without_weekday) {
        return None;
    }
    match mailparse::dateparse(without_weekday) {
        Ok(ts) if ts > 0 => DateTime::from_timestamp(ts, 0).map(|dt| dt.fixed_offset()),
        _ => None,
    }
}

/// Drop a leading `Ddd, ` day-of-week
fn strip_weekday(value: &str) -> &str {
    match value.split_once(',') {
        Some((day, rest)) if day.len() == 3 && day.chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.trim_start()
        }
        _ => value,
    }
}

fn has_month_name(value: &str) -> bool {
    value
        .split(|c: char| !c.is_ascii_alphabetic())
        .any(|word| word.len() >= 3 && MONTHS.contains(&word[..3].to_ascii_lowercase().as_str()))
}

fn normalize_date(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    match collapsed.rfind('(') {
        Some(pos) if collapsed.ends_with(')') => collapsed[..pos].trim_end().to_string(),
        _ => collapsed,
    }
}

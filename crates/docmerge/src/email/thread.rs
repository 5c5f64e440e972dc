use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

use super::EmailRecord;

static RE_REPLY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(RE|FW|FWD):\s*").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
];

/// Groups messages into conversations by normalized subject.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmailThreader;

impl EmailThreader {
    pub fn new() -> Self {
        Self
    }

    /// Case-folded subject with one leading reply/forward prefix removed and
    /// whitespace collapsed.
    pub fn normalize_subject(subject: &str) -> String {
        let stripped = RE_REPLY_PREFIX.replace(subject, "");
        RE_WHITESPACE
            .replace_all(&stripped, " ")
            .trim()
            .to_lowercase()
    }

    /// Sort key for a date header: UTC when the value carries an offset, the
    /// wall-clock value when it does not, and the minimum date when it cannot
    /// be parsed.
    pub fn normalize_date(value: Option<&str>) -> NaiveDateTime {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return NaiveDateTime::MIN;
        };

        if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
            return dt.naive_utc();
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return dt.naive_utc();
        }
        for format in NAIVE_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
                return dt;
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return date.and_hms_opt(0, 0, 0).unwrap_or(NaiveDateTime::MIN);
        }
        NaiveDateTime::MIN
    }

    /// Thread key for a message. Subjectless messages each get their own key.
    pub fn thread_key(record: &EmailRecord) -> String {
        let normalized = Self::normalize_subject(&record.subject);
        if normalized.is_empty() {
            format!("no_subject_{}", record.source.display())
        } else {
            normalized
        }
    }

    /// Threads keyed and ordered by thread key; messages inside a thread are
    /// in date order, ties kept in input order.
    pub fn group(&self, records: Vec<EmailRecord>) -> BTreeMap<String, Vec<EmailRecord>> {
        let mut threads: BTreeMap<String, Vec<EmailRecord>> = BTreeMap::new();
        for record in records {
            threads.entry(Self::thread_key(&record)).or_default().push(record);
        }
        for emails in threads.values_mut() {
            emails.sort_by_cached_key(|e| Self::normalize_date(e.date.as_deref()));
        }
        threads
    }
}

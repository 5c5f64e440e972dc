//! Email inputs: parsing `.eml`/`.msg` files, grouping them into threads and
//! writing the text outputs.

pub mod extract;
pub mod render;
pub mod thread;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

pub use extract::{extract_all, extract_email};
pub use render::{EmailWriter, ThreadBlock};
pub use thread::EmailThreader;

/// Shown in place of a missing or blank subject.
pub const NO_SUBJECT: &str = "(No Subject)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentRef {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: Option<u64>,
}

/// One parsed message. Header values are kept as display strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRecord {
    pub subject: String,
    pub from: String,
    pub to: String,
    pub cc: String,
    pub date: Option<String>,
    pub body: String,
    pub attachments: Vec<AttachmentRef>,
    pub source: PathBuf,
}

impl EmailRecord {
    pub fn display_subject(&self) -> &str {
        if self.subject.trim().is_empty() {
            NO_SUBJECT
        } else {
            &self.subject
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadRef {
    pub thread_key: String,
    pub email_count: usize,
}

/// Totals reported under `emails` in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmailSummary {
    pub parsed_total: usize,
    pub failed_total: usize,
    pub attachment_refs_total: usize,
    pub threads_total: usize,
    pub batches_total: usize,
    pub output_total_bytes: u64,
    pub batch_to_threads: BTreeMap<String, Vec<ThreadRef>>,
}

impl EmailSummary {
    pub fn merge(&mut self, other: EmailSummary) {
        self.parsed_total += other.parsed_total;
        self.failed_total += other.failed_total;
        self.attachment_refs_total += other.attachment_refs_total;
        self.threads_total += other.threads_total;
        self.batches_total += other.batches_total;
        self.output_total_bytes += other.output_total_bytes;
        self.batch_to_threads.extend(other.batch_to_threads);
    }
}

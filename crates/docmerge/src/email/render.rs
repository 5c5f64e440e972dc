//! Plain-text rendering of threads and the two email output modes.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::info;

use super::{EmailRecord, EmailSummary, ThreadRef};
use crate::config::{EmailConfig, EmailOutputMode, MAX_BATCH_WORDS};
use crate::error::StorageError;
use crate::ledger::{Ledger, WarningKind};
use crate::packer::{self, count_words, Caps, Measured};
use crate::processor::BatchOutput;
use crate::sanitize::redact_path;

const RULE_WIDTH: usize = 80;

/// One rendered thread with its measurements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadBlock {
    pub thread_key: String,
    pub email_count: usize,
    pub text: String,
    pub bytes: u64,
    pub words: usize,
    /// Email files rendered into this block, in thread order.
    pub sources: Vec<PathBuf>,
}

impl ThreadBlock {
    fn measured(&self) -> Measured {
        Measured::new(self.bytes, self.words)
    }

    fn thread_ref(&self) -> ThreadRef {
        ThreadRef {
            thread_key: self.thread_key.clone(),
            email_count: self.email_count,
        }
    }
}

pub fn render_entry(
    email: &EmailRecord,
    index: usize,
    total: usize,
    include_attachments: bool,
) -> String {
    let equals = "=".repeat(RULE_WIDTH);
    let mut lines = vec![
        format!("EMAIL {} of {}", index, total),
        equals.clone(),
        format!("Subject: {}", email.display_subject()),
        format!("From: {}", email.from),
        format!("To: {}", email.to),
        format!("CC: {}", email.cc),
        format!("Date: {}", email.date.as_deref().unwrap_or("")),
        format!("Source: {}", redact_path(&email.source)),
        "-".repeat(RULE_WIDTH),
        String::new(),
        email.body.clone(),
        String::new(),
    ];

    if include_attachments {
        lines.push("ATTACHMENTS:".to_string());
        if email.attachments.is_empty() {
            lines.push("- none".to_string());
        }
        for attachment in &email.attachments {
            let size = attachment
                .size_bytes
                .map_or_else(|| "unknown".to_string(), |s| s.to_string());
            lines.push(format!(
                "- {} (type={}, bytes={})",
                attachment.filename, attachment.content_type, size
            ));
        }
        lines.push(String::new());
    }

    lines.push(equals);
    lines.push(String::new());
    lines.join("\n")
}

pub fn render_thread(
    number: usize,
    thread_key: &str,
    emails: &[EmailRecord],
    include_attachments: bool,
) -> String {
    let key = if thread_key.is_empty() {
        "(no subject)"
    } else {
        thread_key
    };
    let mut lines = vec![
        format!("EMAIL THREAD {}", number),
        format!("THREAD KEY: {}", key),
        format!("TOTAL EMAILS: {}", emails.len()),
        "=".repeat(RULE_WIDTH),
        String::new(),
    ];
    for (idx, email) in emails.iter().enumerate() {
        lines.push(render_entry(email, idx + 1, emails.len(), include_attachments));
    }
    lines.join("\n")
}

/// Written email outputs and their share of the `emails` summary.
#[derive(Debug, Default)]
pub struct EmailOutput {
    pub outputs: Vec<BatchOutput>,
    pub summary: EmailSummary,
}

impl EmailOutput {
    #[cfg(test)]
    fn paths(&self) -> Vec<PathBuf> {
        self.outputs.iter().map(|o| o.path.clone()).collect()
    }
}

/// Turns threads into text files according to the email config.
#[derive(Debug, Clone)]
pub struct EmailWriter {
    mode: EmailOutputMode,
    include_attachments: bool,
    batch_prefix: String,
    caps: Caps,
}

impl EmailWriter {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            mode: config.output_mode,
            include_attachments: config.include_attachment_index,
            batch_prefix: config.batch_name_prefix.clone(),
            caps: Caps {
                max_bytes: config.max_batch_bytes(),
                max_words: MAX_BATCH_WORDS,
            },
        }
    }

    pub fn mode(&self) -> EmailOutputMode {
        self.mode
    }

    /// Renders threads in key order, numbered from 1.
    pub fn blocks(&self, threads: &BTreeMap<String, Vec<EmailRecord>>) -> Vec<ThreadBlock> {
        threads
            .iter()
            .enumerate()
            .map(|(idx, (key, emails))| {
                let text = render_thread(idx + 1, key, emails, self.include_attachments);
                ThreadBlock {
                    thread_key: key.clone(),
                    email_count: emails.len(),
                    bytes: text.len() as u64,
                    words: count_words(&text),
                    sources: emails.iter().map(|e| e.source.clone()).collect(),
                    text,
                }
            })
            .collect()
    }

    /// Output files the blocks will occupy: one per thread in threaded mode,
    /// capped batches otherwise. Over-cap threads are recorded here.
    pub fn plan(&self, blocks: &[ThreadBlock], group: &str, ledger: &mut Ledger) -> Vec<Range<usize>> {
        if self.mode == EmailOutputMode::Threaded {
            return (0..blocks.len()).map(|i| i..i + 1).collect();
        }

        for block in blocks {
            let measured = block.measured();
            if measured.exceeds_bytes(self.caps) {
                ledger.record(WarningKind::EmailThreadExceedsBatchCap {
                    thread_key: block.thread_key.clone(),
                    group: group.to_string(),
                    thread_bytes: block.bytes,
                    batch_limit_bytes: self.caps.max_bytes,
                });
            }
            if measured.exceeds_words(self.caps) {
                ledger.record(WarningKind::EmailThreadExceedsWordCap {
                    thread_key: block.thread_key.clone(),
                    group: group.to_string(),
                    thread_words: block.words,
                    batch_limit_words: self.caps.max_words,
                });
            }
        }
        packer::plan(blocks.iter().map(ThreadBlock::measured), self.caps)
    }

    pub fn write(
        &self,
        blocks: &[ThreadBlock],
        plan: &[Range<usize>],
        dir: &Path,
        group: &str,
    ) -> Result<EmailOutput, StorageError> {
        let mut output = EmailOutput::default();
        output.summary.threads_total = blocks.len();

        for (idx, range) in plan.iter().enumerate() {
            let number = idx + 1;
            let batch = &blocks[range.clone()];
            let (path, content) = match self.mode {
                EmailOutputMode::Threaded => (
                    dir.join(format!("{}_emails_thread{}.txt", group, number)),
                    format!(
                        "GROUP: {}\n{}",
                        group,
                        batch.iter().map(|b| b.text.as_str()).collect::<Vec<_>>().join("\n")
                    ),
                ),
                EmailOutputMode::SizeBatched => (
                    dir.join(format!("{}_{}{}.txt", group, self.batch_prefix, number)),
                    batch_file_content(number, group, batch),
                ),
            };

            std::fs::write(&path, &content).map_err(|e| StorageError::WriteFile {
                path: path.clone(),
                source: e,
            })?;
            let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            info!(
                output = %redact_path(&path),
                threads = batch.len(),
                bytes,
                "Wrote email output"
            );

            output.summary.output_total_bytes += bytes;
            output
                .summary
                .batch_to_threads
                .insert(path.display().to_string(), batch.iter().map(ThreadBlock::thread_ref).collect());
            output.outputs.push(BatchOutput {
                path,
                sources: batch.iter().flat_map(|b| b.sources.iter().cloned()).collect(),
            });
        }
        output.summary.batches_total = output.outputs.len();
        Ok(output)
    }
}

fn batch_file_content(number: usize, group: &str, batch: &[ThreadBlock]) -> String {
    let words: usize = batch.iter().map(|b| b.words).sum();
    let mut content = format!(
        "EMAIL BATCH {}\nGROUP: {}\nBATCH THREADS: {}\nBATCH WORDS: {}\n{}\n\n",
        number,
        group,
        batch.len(),
        words,
        "=".repeat(RULE_WIDTH)
    );
    for (idx, block) in batch.iter().enumerate() {
        if idx > 0 {
            content.push('\n');
        }
        content.push_str(&block.text);
    }
    content
}

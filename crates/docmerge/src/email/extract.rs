//! Header, body and attachment extraction for `.eml` and `.msg` files.

use std::path::{Path, PathBuf};

use base64::Engine;
use log::debug;
use mail_parser::{Addr, Address, MessageParser, MimeHeaders};
use msg_parser::Outlook;

use super::{AttachmentRef, EmailRecord, EmailSummary};
use crate::error::ProcessError;
use crate::ledger::{Ledger, WarningKind};

const UNNAMED_ATTACHMENT: &str = "unnamed_attachment";

/// Parses one email file, choosing the decoder by extension.
pub fn extract_email(path: &Path) -> Result<EmailRecord, ProcessError> {
    let is_msg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("msg"));
    if is_msg {
        extract_msg(path)
    } else {
        extract_eml(path)
    }
}

/// Parses every file, recording `email_extract_failed` for those that do not
/// parse. The returned summary carries the parse counters only.
pub fn extract_all(paths: &[PathBuf], ledger: &mut Ledger) -> (Vec<EmailRecord>, EmailSummary) {
    let mut records = Vec::with_capacity(paths.len());
    let mut summary = EmailSummary::default();

    for path in paths {
        match extract_email(path) {
            Ok(record) => {
                summary.parsed_total += 1;
                summary.attachment_refs_total += record.attachments.len();
                records.push(record);
            }
            Err(e) => {
                debug!("Email extraction failed for {}: {}", path.display(), e);
                ledger.record(WarningKind::EmailExtractFailed {
                    file: path.clone(),
                    error: e.to_string(),
                });
                summary.failed_total += 1;
            }
        }
    }
    (records, summary)
}

fn extract_eml(path: &Path) -> Result<EmailRecord, ProcessError> {
    let raw = std::fs::read(path).map_err(|e| ProcessError::ReadDocument {
        path: path.to_path_buf(),
        source: e,
    })?;
    let message = MessageParser::default()
        .parse(&raw)
        .ok_or_else(|| ProcessError::EmailParse("Failed to parse email message".to_string()))?;
    if message.headers().is_empty() {
        return Err(ProcessError::EmailParse("Message has no headers".to_string()));
    }

    let body = message
        .body_text(0)
        .or_else(|| message.body_html(0))
        .map(|b| b.to_string())
        .unwrap_or_default();

    let attachments = message
        .attachments()
        .map(|part| {
            let content_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_default();
            AttachmentRef {
                filename: part
                    .attachment_name()
                    .filter(|n| !n.is_empty())
                    .unwrap_or(UNNAMED_ATTACHMENT)
                    .to_string(),
                content_type,
                size_bytes: Some(part.contents().len() as u64),
            }
        })
        .collect();

    Ok(EmailRecord {
        subject: message.subject().unwrap_or_default().to_string(),
        from: message.from().map(format_addresses).unwrap_or_default(),
        to: message.to().map(format_addresses).unwrap_or_default(),
        cc: message.cc().map(format_addresses).unwrap_or_default(),
        date: message.date().map(|d| d.to_rfc3339()),
        body,
        attachments,
        source: path.to_path_buf(),
    })
}

fn extract_msg(path: &Path) -> Result<EmailRecord, ProcessError> {
    let outlook = Outlook::from_path(path)
        .map_err(|e| ProcessError::EmailParse(format!("Failed to parse MSG file: {}", e)))?;

    let attachments = outlook
        .attachments
        .iter()
        .map(|att| {
            let filename = [&att.file_name, &att.display_name]
                .into_iter()
                .find(|n| !n.is_empty())
                .cloned()
                .unwrap_or_else(|| UNNAMED_ATTACHMENT.to_string());
            let size_bytes = base64::engine::general_purpose::STANDARD
                .decode(att.payload.as_bytes())
                .ok()
                .map(|bytes| bytes.len() as u64);
            AttachmentRef {
                filename,
                content_type: att.mime_tag.clone(),
                size_bytes,
            }
        })
        .collect();

    let date = Some(outlook.headers.date.clone()).filter(|d| !d.trim().is_empty());

    Ok(EmailRecord {
        subject: outlook.subject.clone(),
        from: format_person(&outlook.sender.name, &outlook.sender.email),
        to: join_people(outlook.to.iter().map(|p| (p.name.as_str(), p.email.as_str()))),
        cc: join_people(outlook.cc.iter().map(|p| (p.name.as_str(), p.email.as_str()))),
        date,
        body: outlook.body.clone(),
        attachments,
        source: path.to_path_buf(),
    })
}

fn format_person(name: &str, email: &str) -> String {
    match (name.is_empty(), email.is_empty()) {
        (false, false) if name != email => format!("{} <{}>", name, email),
        (false, _) => name.to_string(),
        _ => email.to_string(),
    }
}

fn join_people<'a>(people: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    people
        .map(|(name, email)| format_person(name, email))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_addresses(address: &Address<'_>) -> String {
    address
        .iter()
        .map(format_address)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_address(addr: &Addr<'_>) -> String {
    match (addr.name(), addr.address()) {
        (Some(name), Some(email)) => format!("{} <{}>", name, email),
        (Some(name), None) => name.to_string(),
        (None, Some(email)) => email.to_string(),
        (None, None) => String::new(),
    }
}

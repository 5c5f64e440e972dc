//! Fixture builders for documents the merger consumes.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use docmerge::convert::{Availability, ConversionSession, DocumentConverter};
use docmerge::ConvertError;
use lopdf::{dictionary, Document, Object, Stream};
use zip::write::SimpleFileOptions;

/// PDF bytes with one line of text per page.
pub fn pdf_bytes(page_texts: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in page_texts {
        let content = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET", text);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_texts.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to serialize PDF");
    bytes
}

pub fn page_count(path: &Path) -> usize {
    Document::load(path).expect("Failed to load PDF").get_pages().len()
}

/// In-memory ZIP with the given entries, stored in order.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("Failed to start ZIP entry");
        writer.write_all(data).expect("Failed to write ZIP entry");
    }
    writer.finish().expect("Failed to finish ZIP").into_inner()
}

/// Minimal DOCX: a package with just `word/document.xml`.
pub fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{}</w:body></w:document>",
        body
    );
    zip_bytes(&[("word/document.xml", xml.as_bytes())])
}

pub struct EmailBuilder {
    subject: Option<String>,
    from: String,
    to: String,
    date: String,
    body: String,
}

impl EmailBuilder {
    pub fn new(subject: &str) -> Self {
        Self {
            subject: Some(subject.to_string()),
            from: "Alice Example <alice@example.com>".to_string(),
            to: "bob@example.com".to_string(),
            date: "Tue, 1 Oct 2024 09:30:00 +0000".to_string(),
            body: "Hello there".to_string(),
        }
    }

    pub fn without_subject() -> Self {
        Self {
            subject: None,
            ..Self::new("")
        }
    }

    pub fn date(mut self, date: &str) -> Self {
        self.date = date.to_string();
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut eml = format!("From: {}\r\nTo: {}\r\n", self.from, self.to);
        if let Some(subject) = &self.subject {
            eml.push_str(&format!("Subject: {}\r\n", subject));
        }
        eml.push_str(&format!(
            "Date: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}\r\n",
            self.date, self.body
        ));
        eml.into_bytes()
    }
}

/// Converter that renders each Word file as a one-page PDF naming it.
/// Files whose stem starts with `slow` time out and `bad` ones fail.
pub struct FakeConverter {
    pub timeout_seconds: u64,
}

impl Default for FakeConverter {
    fn default() -> Self {
        Self { timeout_seconds: 30 }
    }
}

struct FakeSession {
    timeout_seconds: u64,
}

impl DocumentConverter for FakeConverter {
    fn availability(&self) -> Availability {
        Availability::available("fake converter")
    }

    fn open_session(
        &self,
        _timeout: Duration,
    ) -> Result<Box<dyn ConversionSession + '_>, ConvertError> {
        Ok(Box::new(FakeSession {
            timeout_seconds: self.timeout_seconds,
        }))
    }
}

impl ConversionSession for FakeSession {
    fn convert(&mut self, source: &Path, out_dir: &Path) -> Result<PathBuf, ConvertError> {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        if stem.starts_with("slow") {
            return Err(ConvertError::Timeout {
                seconds: self.timeout_seconds,
            });
        }
        if stem.starts_with("bad") {
            return Err(ConvertError::Failed("renderer crashed".to_string()));
        }
        let output = out_dir.join(format!("{}.pdf", stem));
        std::fs::write(&output, pdf_bytes(&[&format!("Converted {}", stem)]))
            .map_err(|e| ConvertError::Failed(e.to_string()))?;
        Ok(output)
    }
}

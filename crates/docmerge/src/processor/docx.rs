//! DOCX batches: the bodies of several Word documents copied into one fresh
//! WordprocessingML package, each preceded by a page break and a heading
//! naming its source.

use std::borrow::Cow;
use std::io::{Read, Seek, Write};
use std::path::Path;
use std::sync::LazyLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;

use crate::error::{ProcessError, StorageError};
use crate::ledger::{Ledger, WarningKind};
use crate::packer::{count_words, file_size_or_cap, Caps, Measured};
use crate::processor::fallback;
use crate::processor::{BatchMerger, BatchOutput, BatchTarget, MergeItem};
use crate::sanitize::redact_path;

const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Body elements that depend on parts or relationships not carried over.
const SKIPPED_ELEMENTS: &[&[u8]] = &[
    b"sectPr",
    b"drawing",
    b"pict",
    b"object",
    b"AlternateContent",
    b"numPr",
    b"altChunk",
    b"footnoteReference",
    b"endnoteReference",
    b"commentRangeStart",
    b"commentRangeEnd",
    b"commentReference",
];

static RE_PARAGRAPH_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</w:p>").unwrap());
static RE_TEXT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").unwrap());

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style><w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="120"/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:sz w:val="32"/></w:rPr></w:style></w:styles>"#;

const PAGE_BREAK: &str = r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#;
const SECTION: &str = r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720" w:gutter="0"/></w:sectPr>"#;

/// Content taken from one source document.
#[derive(Debug)]
enum Body {
    /// Serialized body children plus the `xmlns:*` declarations they rely on.
    Xml {
        namespaces: Vec<(String, String)>,
        content: Vec<u8>,
        words: usize,
    },
    /// Plain paragraphs recovered by a fallback decoder.
    Text(String),
}

impl Body {
    fn words(&self) -> usize {
        match self {
            Body::Xml { words, .. } => *words,
            Body::Text(text) => count_words(text),
        }
    }
}

/// Why a source contributed nothing.
#[derive(Debug)]
enum LoadFailure {
    Unreadable(String),
    AppendFailed(String),
}

pub struct DocxMerger {
    caps: Caps,
}

impl DocxMerger {
    pub fn new(caps: Caps) -> Self {
        Self { caps }
    }
}

impl BatchMerger for DocxMerger {
    fn caps(&self) -> Caps {
        self.caps
    }

    fn measure(&self, items: &[MergeItem], ledger: &mut Ledger) -> Vec<Measured> {
        let _span = tracing::info_span!("processor.docx.measure", files = items.len()).entered();

        items
            .iter()
            .map(|item| {
                let (bytes, stat_error) = file_size_or_cap(&item.path, self.caps.max_bytes);
                if let Some(e) = stat_error {
                    ledger.record(WarningKind::DocxStatFailed {
                        file: item.source.clone(),
                        error: e.to_string(),
                    });
                }

                let words = load_body(&item.path).map(|b| b.words()).unwrap_or(0);
                if words > self.caps.max_words {
                    ledger.record(WarningKind::DocxExceedsWordCap {
                        file: item.source.clone(),
                        file_words: words,
                        batch_limit_words: self.caps.max_words,
                    });
                }
                Measured::new(bytes, words)
            })
            .collect()
    }

    /// Writes one `.docx` batch. Returns `None` when no source could be
    /// appended; nothing is written then.
    fn write_batch(
        &self,
        items: &[MergeItem],
        target: BatchTarget<'_>,
        ledger: &mut Ledger,
    ) -> Result<Option<BatchOutput>, StorageError> {
        let _span = tracing::info_span!("processor.docx.batch", batch = target.number).entered();

        let mut document = DocumentBuilder::default();
        let mut sources = Vec::new();

        for item in items {
            let body = match load_body(&item.path) {
                Ok(body) => body,
                Err(LoadFailure::Unreadable(error)) => {
                    ledger.record(WarningKind::DocxUnreadable {
                        file: item.source.clone(),
                        error,
                    });
                    continue;
                }
                Err(LoadFailure::AppendFailed(error)) => {
                    ledger.record(WarningKind::DocxAppendFailed {
                        file: item.source.clone(),
                        error,
                    });
                    continue;
                }
            };
            if body.words() == 0 {
                ledger.record(WarningKind::DocxEmptyDocument {
                    file: item.source.clone(),
                });
                continue;
            }

            document.append(&redact_path(&item.source), body);
            sources.push(item.source.clone());
        }

        if document.is_empty() {
            ledger.record(WarningKind::DocxEmptyBatch {
                group: target.group.to_string(),
                batch: target.number,
                file_count: items.len(),
            });
            return Ok(None);
        }

        let path = target.path("docx");
        let file = std::fs::File::create(&path).map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        document
            .write_package(file)
            .map_err(|e| StorageError::WriteFile {
                path: path.clone(),
                source: std::io::Error::other(e.to_string()),
            })?;

        info!(
            output = %redact_path(&path),
            files = sources.len(),
            "Created DOCX batch"
        );
        Ok(Some(BatchOutput { path, sources }))
    }
}

/// Reads the body of a Word file, trying the package layout first and the
/// legacy OLE container last.
fn load_body(path: &Path) -> Result<Body, LoadFailure> {
    let file = std::fs::File::open(path).map_err(|e| LoadFailure::Unreadable(e.to_string()))?;

    let mut archive = match zip::ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(zip_error) => {
            return fallback::ole_text(path).map(Body::Text).map_err(|ole_error| {
                LoadFailure::Unreadable(format!("{}; {}", zip_error, ole_error))
            });
        }
    };

    let xml = read_document_xml(&mut archive).map_err(|e| LoadFailure::Unreadable(e.to_string()))?;
    match copy_body(&xml) {
        Ok(body) => Ok(body),
        Err(e) => {
            debug!("Lenient text recovery for {}: {}", path.display(), e);
            let text = raw_paragraph_text(&xml);
            if text.trim().is_empty() {
                Err(LoadFailure::AppendFailed(e.to_string()))
            } else {
                Ok(Body::Text(text))
            }
        }
    }
}

fn read_document_xml<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Result<String, ProcessError> {
    let name = if archive.index_for_name("word/document.xml").is_some() {
        "word/document.xml".to_string()
    } else {
        archive
            .file_names()
            .find(|n| n.to_lowercase().ends_with("document.xml"))
            .map(str::to_string)
            .ok_or_else(|| ProcessError::DocxProcessing("No document.xml entry".to_string()))?
    };

    let mut entry = archive
        .by_name(&name)
        .map_err(|e| ProcessError::DocxProcessing(format!("Failed to open {}: {}", name, e)))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| ProcessError::DocxProcessing(format!("Failed to read {}: {}", name, e)))?;
    Ok(xml)
}

/// Serializes the children of `w:body`, dropping elements that reference
/// parts of the source package.
fn copy_body(xml: &str) -> Result<Body, ProcessError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut namespaces = Vec::new();
    let mut in_body = false;
    let mut skip_depth = 0usize;
    let mut words = 0usize;
    let mut found_body = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ProcessError::DocxProcessing(format!("XML parsing error: {}", e)))?;

        match &event {
            Event::Eof => break,
            Event::Start(e) if !in_body => {
                match e.local_name().as_ref() {
                    b"document" => namespaces = namespace_declarations(e),
                    b"body" => {
                        in_body = true;
                        found_body = true;
                    }
                    _ => {}
                }
                continue;
            }
            Event::End(e) if in_body && skip_depth == 0 && e.local_name().as_ref() == b"body" => {
                in_body = false;
                continue;
            }
            _ if !in_body => continue,
            _ => {}
        }

        if skip_depth > 0 {
            match &event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                _ => {}
            }
            continue;
        }

        let out = match event {
            Event::Start(e) if is_skipped(&e) => {
                skip_depth = 1;
                continue;
            }
            Event::Empty(e) if is_skipped(&e) => continue,
            Event::Start(e) if e.local_name().as_ref() == b"hyperlink" => {
                Event::Start(BytesStart::new(
                    String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                ))
            }
            Event::Text(e) => {
                words += count_words(&String::from_utf8_lossy(&e));
                Event::Text(e)
            }
            other => other,
        };
        writer
            .write_event(out)
            .map_err(|e| ProcessError::DocxProcessing(format!("XML write error: {}", e)))?;
    }

    if !found_body {
        return Err(ProcessError::DocxProcessing("Missing w:body element".to_string()));
    }
    Ok(Body::Xml {
        namespaces,
        content: writer.into_inner(),
        words,
    })
}

fn is_skipped(element: &BytesStart<'_>) -> bool {
    let local = element.local_name();
    SKIPPED_ELEMENTS.contains(&local.as_ref())
}

fn namespace_declarations(root: &BytesStart<'_>) -> Vec<(String, String)> {
    root.attributes()
        .flatten()
        .filter_map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            key.starts_with("xmlns:")
                .then(|| (key, String::from_utf8_lossy(&attr.value).into_owned()))
        })
        .collect()
}

/// Text of every `w:t` run, one line per paragraph. Works on documents the
/// XML reader rejects.
fn raw_paragraph_text(xml: &str) -> String {
    RE_PARAGRAPH_END
        .split(xml)
        .map(|paragraph| {
            RE_TEXT_RUN
                .captures_iter(paragraph)
                .map(|c| {
                    let raw = &c[1];
                    quick_xml::escape::unescape(raw)
                        .map(Cow::into_owned)
                        .unwrap_or_else(|_| raw.to_string())
                })
                .collect::<String>()
        })
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Default)]
struct DocumentBuilder {
    namespaces: Vec<(String, String)>,
    body: Vec<u8>,
    documents: usize,
}

impl DocumentBuilder {
    fn is_empty(&self) -> bool {
        self.documents == 0
    }

    fn append(&mut self, name: &str, body: Body) {
        if self.documents > 0 {
            self.body.extend_from_slice(PAGE_BREAK.as_bytes());
        }
        self.body.extend_from_slice(
            format!(
                r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t xml:space="preserve">Document: {}</w:t></w:r></w:p>"#,
                quick_xml::escape::escape(name)
            )
            .as_bytes(),
        );

        match body {
            Body::Xml {
                namespaces,
                content,
                ..
            } => {
                for (key, value) in namespaces {
                    if !self.namespaces.iter().any(|(k, _)| *k == key) {
                        self.namespaces.push((key, value));
                    }
                }
                self.body.extend_from_slice(&content);
            }
            Body::Text(text) => {
                for line in text.lines() {
                    self.body.extend_from_slice(
                        format!(
                            r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
                            quick_xml::escape::escape(line)
                        )
                        .as_bytes(),
                    );
                }
            }
        }
        self.documents += 1;
    }

    fn document_xml(&self) -> Vec<u8> {
        let mut root = format!(r#"<w:document xmlns:w="{}" xmlns:r="{}""#, NS_W, NS_R);
        for (key, value) in &self.namespaces {
            if key == "xmlns:w" || key == "xmlns:r" {
                continue;
            }
            root.push_str(&format!(r#" {}="{}""#, key, quick_xml::escape::escape(value)));
        }
        root.push('>');

        let mut xml = Vec::with_capacity(self.body.len() + 1024);
        xml.extend_from_slice(br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.extend_from_slice(root.as_bytes());
        xml.extend_from_slice(b"<w:body>");
        xml.extend_from_slice(&self.body);
        xml.extend_from_slice(SECTION.as_bytes());
        xml.extend_from_slice(b"</w:body></w:document>");
        xml
    }

    fn write_package<W: Write + Seek>(&self, out: W) -> zip::result::ZipResult<()> {
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        let mut zip = zip::ZipWriter::new(out);

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(CONTENT_TYPES.as_bytes())?;
        zip.start_file("_rels/.rels", options)?;
        zip.write_all(PACKAGE_RELS.as_bytes())?;
        zip.start_file("word/document.xml", options)?;
        zip.write_all(&self.document_xml())?;
        zip.start_file("word/styles.xml", options)?;
        zip.write_all(STYLES.as_bytes())?;
        zip.start_file("word/_rels/document.xml.rels", options)?;
        zip.write_all(DOCUMENT_RELS.as_bytes())?;

        zip.finish()?;
        Ok(())
    }
}

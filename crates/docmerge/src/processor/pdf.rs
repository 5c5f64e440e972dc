use std::path::Path;

use lopdf::{dictionary, Bookmark, Dictionary, Document, Object, ObjectId};
use tracing::{debug, info};

use crate::error::StorageError;
use crate::ledger::{Ledger, WarningKind};
use crate::packer::{count_words, file_size_or_cap, Caps, Measured};
use crate::processor::fallback;
use crate::processor::{BatchMerger, BatchOutput, BatchTarget, MergeItem};

/// Page attributes a page may inherit from its `Pages` ancestors.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];
const MAX_PARENT_HOPS: usize = 64;

pub struct PdfMerger {
    caps: Caps,
}

impl PdfMerger {
    pub fn new(caps: Caps) -> Self {
        Self { caps }
    }
}

impl BatchMerger for PdfMerger {
    fn caps(&self) -> Caps {
        self.caps
    }

    /// Byte size and word count per item. Unreadable sizes fall back to the
    /// byte cap; unreadable text counts as zero words.
    fn measure(&self, items: &[MergeItem], ledger: &mut Ledger) -> Vec<Measured> {
        let _span = tracing::info_span!("processor.pdf.measure", files = items.len()).entered();

        items
            .iter()
            .map(|item| {
                let (bytes, stat_error) = file_size_or_cap(&item.path, self.caps.max_bytes);
                if let Some(e) = stat_error {
                    ledger.record(WarningKind::PdfStatFailed {
                        file: item.source.clone(),
                        error: e.to_string(),
                    });
                }

                let words = count_pdf_words(&item.path);
                if words > self.caps.max_words {
                    ledger.record(WarningKind::PdfExceedsWordCap {
                        file: item.source.clone(),
                        file_words: words,
                        batch_limit_words: self.caps.max_words,
                    });
                }
                Measured::new(bytes, words)
            })
            .collect()
    }

    /// Merges one batch. Returns `None` when no item contributed a page, in
    /// which case nothing is written.
    fn write_batch(
        &self,
        items: &[MergeItem],
        target: BatchTarget<'_>,
        ledger: &mut Ledger,
    ) -> Result<Option<BatchOutput>, StorageError> {
        let _span = tracing::info_span!("processor.pdf.batch", batch = target.number).entered();

        let mut builder = PdfBatchBuilder::new();
        let mut sources = Vec::new();

        for item in items {
            let added = match load_source(item, ledger) {
                Some(doc) => builder.append(doc, item.title.as_deref()),
                None => continue,
            };
            match added {
                Appended::Pages(count) => {
                    debug!(
                        file = %crate::sanitize::redact_path(&item.source),
                        pages = count,
                        "Appended source"
                    );
                    if !sources.contains(&item.source) {
                        sources.push(item.source.clone());
                    }
                }
                Appended::Empty { converted } => {
                    let file = item.source.clone();
                    ledger.record(if converted {
                        WarningKind::PdfConversionEmpty { file }
                    } else {
                        WarningKind::PdfNoPages { file }
                    });
                }
            }
        }

        if builder.page_count() == 0 {
            ledger.record(WarningKind::PdfEmptyBatch {
                group: target.group.to_string(),
                batch: target.number,
                file_count: items.len(),
            });
            return Ok(None);
        }

        let path = target.path("pdf");
        let pages = builder.page_count();
        let bytes = builder.finish().map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: std::io::Error::other(e.to_string()),
        })?;
        std::fs::write(&path, bytes).map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        info!(
            output = %crate::sanitize::redact_path(&path),
            files = items.len(),
            pages,
            "Created PDF batch"
        );
        Ok(Some(BatchOutput { path, sources }))
    }
}

enum Appended {
    Pages(usize),
    Empty { converted: bool },
}

struct Loaded {
    doc: Document,
    converted: bool,
}

/// Opens an item as PDF, falling back to the image and OLE decoders.
/// Failures are recorded and yield `None`.
fn load_source(item: &MergeItem, ledger: &mut Ledger) -> Option<Loaded> {
    let error = match Document::load(&item.path) {
        Ok(mut doc) => {
            if doc.is_encrypted() && doc.decrypt("").is_err() {
                ledger.record(WarningKind::PdfEncrypted {
                    file: item.source.clone(),
                });
                return None;
            }
            return Some(Loaded {
                doc,
                converted: false,
            });
        }
        Err(e) => e.to_string(),
    };

    debug!("Falling back for {}: {}", item.path.display(), error);
    let converted = fallback::image_to_pdf(&item.path)
        .or_else(|_| fallback::ole_to_pdf(&item.path))
        .ok();
    let Some(bytes) = converted else {
        ledger.record(WarningKind::PdfUnreadable {
            file: item.source.clone(),
            error,
        });
        return None;
    };

    match Document::load_mem(&bytes) {
        Ok(doc) => Some(Loaded {
            doc,
            converted: true,
        }),
        Err(e) => {
            ledger.record(WarningKind::PdfConversionFailed {
                file: item.source.clone(),
                error: e.to_string(),
            });
            None
        }
    }
}

/// Word count of a PDF's extractable text; zero when it cannot be read.
pub fn count_pdf_words(path: &Path) -> usize {
    let Ok(mut doc) = Document::load(path) else {
        return 0;
    };
    if doc.is_encrypted() && doc.decrypt("").is_err() {
        return 0;
    }
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    if pages.is_empty() {
        return 0;
    }
    doc.extract_text(&pages)
        .map(|text| count_words(&text))
        .unwrap_or(0)
}

/// Accumulates pages from several documents under one page tree.
struct PdfBatchBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl PdfBatchBuilder {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    fn page_count(&self) -> usize {
        self.kids.len()
    }

    fn append(&mut self, loaded: Loaded, title: Option<&str>) -> Appended {
        let Loaded {
            doc: mut source,
            converted,
        } = loaded;
        source.renumber_objects_with(self.doc.max_id + 1);

        let page_ids: Vec<ObjectId> = source.get_pages().into_values().collect();
        let mut pages: Vec<(ObjectId, Dictionary)> = Vec::with_capacity(page_ids.len());
        for id in &page_ids {
            if let Ok(dict) = source.get_dictionary(*id) {
                let mut dict = dict.clone();
                inherit_attributes(&source, &mut dict);
                dict.set("Parent", self.pages_id);
                pages.push((*id, dict));
            }
        }
        if pages.is_empty() {
            return Appended::Empty { converted };
        }

        let max_id = source.max_id;
        for (id, object) in source.objects {
            if page_ids.contains(&id) || is_tree_node(&object) {
                continue;
            }
            self.doc.objects.insert(id, object);
        }

        let first_page = pages[0].0;
        let count = pages.len();
        for (id, dict) in pages {
            self.doc.objects.insert(id, Object::Dictionary(dict));
            self.kids.push(id);
        }
        self.doc.max_id = self.doc.max_id.max(max_id);

        if let Some(title) = title {
            let bookmark = Bookmark::new(title.to_string(), [0.0, 0.0, 1.0], 0, first_page);
            self.doc.add_bookmark(bookmark, None);
        }
        Appended::Pages(count)
    }

    fn finish(mut self) -> Result<Vec<u8>, lopdf::Error> {
        let kids: Vec<Object> = self.kids.iter().map(|id| Object::Reference(*id)).collect();
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => self.kids.len() as i64,
            }),
        );

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        };
        if let Some(outline_id) = self.doc.build_outline() {
            catalog.set("Outlines", outline_id);
        }
        let catalog_id = self.doc.add_object(catalog);
        self.doc.trailer.set("Root", catalog_id);
        self.doc.prune_objects();

        let mut buffer = Vec::new();
        self.doc.save_to(&mut buffer)?;
        Ok(buffer)
    }
}

fn is_tree_node(object: &Object) -> bool {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        _ => return false,
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(b"Catalog") | Ok(b"Pages")
    )
}

fn inherit_attributes(source: &Document, page: &mut Dictionary) {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut hops = 0;
    while let Some(parent_id) = parent {
        if hops >= MAX_PARENT_HOPS {
            break;
        }
        hops += 1;
        let Ok(node) = source.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
}

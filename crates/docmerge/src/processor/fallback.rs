//! Last-resort decoders for inputs that fail to open as their extension
//! claims: images saved with a `.pdf` name and legacy OLE Word files.

use std::io::Read;
use std::path::Path;

use image::GenericImageView;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::error::ProcessError;
use crate::sanitize::redact_path;

const PAGE_WIDTH: f64 = 612.0;
const PAGE_HEIGHT: f64 = 792.0;
const LINES_PER_PAGE: usize = 50;
const WRAP_WIDTH: usize = 80;
/// Printable runs shorter than this are treated as binary noise.
const MIN_RUN_LEN: usize = 4;

/// Decodes an image file and places it, scaled to fit, on a single Letter
/// page.
pub fn image_to_pdf(path: &Path) -> Result<Vec<u8>, ProcessError> {
    let image_data = std::fs::read(path).map_err(|e| ProcessError::ReadDocument {
        path: path.to_path_buf(),
        source: e,
    })?;
    let img = image::load_from_memory(&image_data)
        .map_err(|e| ProcessError::ImageProcessing(format!("Failed to load image: {}", e)))?;

    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(ProcessError::ImageProcessing("Image has no pixels".to_string()));
    }
    let rgb = img.to_rgb8();

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        rgb.into_raw(),
    ));
    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! {
            "Im1" => image_id,
        },
    });

    let margin = 36.0_f64;
    let scale = ((PAGE_WIDTH - 2.0 * margin) / width as f64)
        .min((PAGE_HEIGHT - 2.0 * margin) / height as f64);
    let img_width = (width as f64 * scale) as i64;
    let img_height = (height as f64 * scale) as i64;
    let x = ((PAGE_WIDTH - img_width as f64) / 2.0) as i64;
    let y = ((PAGE_HEIGHT - img_height as f64) / 2.0) as i64;

    let content = format!(
        "q\n{} 0 0 {} {} {} cm\n/Im1 Do\nQ\n",
        img_width, img_height, x, y
    );
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Resources" => resources_id,
        "Contents" => content_id,
    });

    finish_document(doc, pages_id, vec![page_id])
}

/// Printable ASCII runs from the `WordDocument` stream of an OLE compound
/// file, one run per line.
pub fn ole_text(path: &Path) -> Result<String, ProcessError> {
    let file = std::fs::File::open(path).map_err(|e| ProcessError::ReadDocument {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut comp = cfb::CompoundFile::open(file).map_err(|e| {
        ProcessError::TextExtraction(format!("Not an OLE compound document: {}", e))
    })?;
    let mut stream = comp.open_stream("WordDocument").map_err(|e| {
        ProcessError::TextExtraction(format!("Missing WordDocument stream: {}", e))
    })?;

    let mut raw = Vec::new();
    stream
        .read_to_end(&mut raw)
        .map_err(|e| ProcessError::TextExtraction(format!("Failed to read stream: {}", e)))?;

    Ok(printable_runs(&raw).join("\n"))
}

fn printable_runs(raw: &[u8]) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    for &byte in raw {
        if (32..127).contains(&byte) || matches!(byte, 9 | 10 | 13) {
            current.push(byte as char);
        } else {
            if current.len() >= MIN_RUN_LEN {
                runs.push(std::mem::take(&mut current));
            }
            current.clear();
        }
    }
    if current.len() >= MIN_RUN_LEN {
        runs.push(current);
    }
    runs
}

/// OLE text rendered as Courier pages, each headed with the source name.
pub fn ole_to_pdf(path: &Path) -> Result<Vec<u8>, ProcessError> {
    let text = ole_text(path)?;
    if text.trim().is_empty() {
        return Err(ProcessError::TextExtraction(
            "No readable text in WordDocument stream".to_string(),
        ));
    }
    text_to_pdf(&format!("[Extracted from: {}]", redact_path(path)), &text)
}

/// Renders plain text on Letter pages with a header line on every page.
pub fn text_to_pdf(header: &str, text: &str) -> Result<Vec<u8>, ProcessError> {
    let lines = wrap_lines(text, WRAP_WIDTH);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut page_ids = Vec::new();
    for chunk in lines.chunks(LINES_PER_PAGE) {
        let content = format_page(header, chunk);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        page_ids.push(page_id);
    }

    finish_document(doc, pages_id, page_ids)
}

fn finish_document(
    mut doc: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
) -> Result<Vec<u8>, ProcessError> {
    let kids: Vec<Object> = page_ids.iter().map(|id| (*id).into()).collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_ids.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ProcessError::PdfProcessing(e.to_string()))?;
    Ok(buffer)
}

fn wrap_lines(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word = word;
            while let Some((cut, _)) = word.char_indices().nth(width) {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let (head, tail) = word.split_at(cut);
                lines.push(head.to_string());
                word = tail;
            }
            if !current.is_empty() && current.len() + 1 + word.len() > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn format_page(header: &str, lines: &[String]) -> String {
    let mut content = String::new();
    content.push_str("BT\n");
    content.push_str("/F1 10 Tf\n");
    content.push_str("40 766 Td\n");
    content.push_str("14 TL\n");
    content.push_str(&format!("({}) Tj T* T*\n", escape_pdf_string(header)));

    for line in lines {
        content.push_str(&format!("({}) Tj T*\n", escape_pdf_string(line)));
    }

    content.push_str("ET\n");
    content
}

fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '(' => "\\(".to_string(),
            ')' => "\\)".to_string(),
            '\\' => "\\\\".to_string(),
            c if c.is_ascii() && !c.is_control() => c.to_string(),
            _ => " ".to_string(),
        })
        .collect()
}

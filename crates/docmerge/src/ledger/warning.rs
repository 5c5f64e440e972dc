use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{ArtifactAction, TransferAction};

/// Every non-fatal condition a run can record. The variant decides the
/// serialized `code`, whether the affected file counts as failed or skipped,
/// and which field names the affected source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum WarningKind {
    // ── PDF ──
    PdfStatFailed {
        file: PathBuf,
        error: String,
    },
    PdfExceedsWordCap {
        file: PathBuf,
        file_words: usize,
        batch_limit_words: usize,
    },
    PdfEncrypted {
        file: PathBuf,
    },
    PdfNoPages {
        file: PathBuf,
    },
    PdfConversionEmpty {
        file: PathBuf,
    },
    PdfConversionFailed {
        file: PathBuf,
        error: String,
    },
    PdfUnreadable {
        file: PathBuf,
        error: String,
    },
    PdfEmptyBatch {
        group: String,
        batch: usize,
        file_count: usize,
    },

    // ── DOCX ──
    DocxStatFailed {
        file: PathBuf,
        error: String,
    },
    DocxExceedsWordCap {
        file: PathBuf,
        file_words: usize,
        batch_limit_words: usize,
    },
    DocxUnreadable {
        file: PathBuf,
        error: String,
    },
    DocxEmptyDocument {
        file: PathBuf,
    },
    DocxAppendFailed {
        file: PathBuf,
        error: String,
    },
    DocxEmptyBatch {
        group: String,
        batch: usize,
        file_count: usize,
    },

    // ── Word conversion ──
    WordToPdfTimeout {
        file: PathBuf,
        timeout: u64,
    },
    WordToPdfFailed {
        file: PathBuf,
        error: String,
    },
    WordConversionNoOutputs {
        group: String,
        attempted: usize,
    },

    // ── Email ──
    EmailExtractFailed {
        file: PathBuf,
        error: String,
    },
    EmailThreadExceedsBatchCap {
        thread_key: String,
        group: String,
        thread_bytes: u64,
        batch_limit_bytes: u64,
    },
    EmailThreadExceedsWordCap {
        thread_key: String,
        group: String,
        thread_words: usize,
        batch_limit_words: usize,
    },

    // ── ZIP ──
    ZipEntrySuspiciousRatio {
        archive: PathBuf,
        entry: String,
        ratio: f64,
    },
    ZipExtractionBudgetExceeded {
        archive: PathBuf,
        budget_bytes: u64,
        extracted_so_far: u64,
    },
    ZipEntrySkippedUnsafePath {
        archive: PathBuf,
        entry: String,
    },
    ZipExtractFailed {
        archive: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entry: Option<String>,
        error: String,
    },
    ZipNestedDepthExceeded {
        archive: PathBuf,
        depth: usize,
        depth_limit: usize,
    },
    ZipEmptyAfterExtraction {
        archive: PathBuf,
    },

    // ── Relocation ──
    UnsupportedRelocateFailed {
        file: PathBuf,
        destination: PathBuf,
        action: TransferAction,
        reason: String,
        origin: String,
        error: String,
    },
    FailedArtifactCreateFailed {
        file: PathBuf,
        destination: PathBuf,
        stage: String,
        action: ArtifactAction,
        error: String,
    },
}

impl WarningKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PdfStatFailed { .. } => "pdf_stat_failed",
            Self::PdfExceedsWordCap { .. } => "pdf_exceeds_word_cap",
            Self::PdfEncrypted { .. } => "pdf_encrypted",
            Self::PdfNoPages { .. } => "pdf_no_pages",
            Self::PdfConversionEmpty { .. } => "pdf_conversion_empty",
            Self::PdfConversionFailed { .. } => "pdf_conversion_failed",
            Self::PdfUnreadable { .. } => "pdf_unreadable",
            Self::PdfEmptyBatch { .. } => "pdf_empty_batch",
            Self::DocxStatFailed { .. } => "docx_stat_failed",
            Self::DocxExceedsWordCap { .. } => "docx_exceeds_word_cap",
            Self::DocxUnreadable { .. } => "docx_unreadable",
            Self::DocxEmptyDocument { .. } => "docx_empty_document",
            Self::DocxAppendFailed { .. } => "docx_append_failed",
            Self::DocxEmptyBatch { .. } => "docx_empty_batch",
            Self::WordToPdfTimeout { .. } => "word_to_pdf_timeout",
            Self::WordToPdfFailed { .. } => "word_to_pdf_failed",
            Self::WordConversionNoOutputs { .. } => "word_conversion_no_outputs",
            Self::EmailExtractFailed { .. } => "email_extract_failed",
            Self::EmailThreadExceedsBatchCap { .. } => "email_thread_exceeds_batch_cap",
            Self::EmailThreadExceedsWordCap { .. } => "email_thread_exceeds_word_cap",
            Self::ZipEntrySuspiciousRatio { .. } => "zip_entry_suspicious_ratio",
            Self::ZipExtractionBudgetExceeded { .. } => "zip_extraction_budget_exceeded",
            Self::ZipEntrySkippedUnsafePath { .. } => "zip_entry_skipped_unsafe_path",
            Self::ZipExtractFailed { .. } => "zip_extract_failed",
            Self::ZipNestedDepthExceeded { .. } => "zip_nested_depth_exceeded",
            Self::ZipEmptyAfterExtraction { .. } => "zip_empty_after_extraction",
            Self::UnsupportedRelocateFailed { .. } => "unsupported_relocate_failed",
            Self::FailedArtifactCreateFailed { .. } => "failed_artifact_create_failed",
        }
    }

    /// Kinds that describe a deliberate safety exclusion rather than a
    /// processing failure.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::ZipEntrySkippedUnsafePath { .. }
                | Self::ZipNestedDepthExceeded { .. }
                | Self::ZipEmptyAfterExtraction { .. }
        )
    }

    /// Leading segment of the code, used as the failed-artifact folder name.
    pub fn stage(&self) -> &'static str {
        let code = self.code();
        code.split_once('_').map_or(code, |(stage, _)| stage)
    }

    /// The input (or `archive::entry` reference) this warning is about.
    /// Batch-level warnings have none and never become file outcomes.
    pub fn source(&self) -> Option<String> {
        let path = |p: &PathBuf| p.display().to_string();
        match self {
            Self::PdfStatFailed { file, .. }
            | Self::PdfExceedsWordCap { file, .. }
            | Self::PdfEncrypted { file }
            | Self::PdfNoPages { file }
            | Self::PdfConversionEmpty { file }
            | Self::PdfConversionFailed { file, .. }
            | Self::PdfUnreadable { file, .. }
            | Self::DocxStatFailed { file, .. }
            | Self::DocxExceedsWordCap { file, .. }
            | Self::DocxUnreadable { file, .. }
            | Self::DocxEmptyDocument { file }
            | Self::DocxAppendFailed { file, .. }
            | Self::WordToPdfTimeout { file, .. }
            | Self::WordToPdfFailed { file, .. }
            | Self::EmailExtractFailed { file, .. }
            | Self::UnsupportedRelocateFailed { file, .. }
            | Self::FailedArtifactCreateFailed { file, .. } => Some(path(file)),
            Self::ZipEntrySuspiciousRatio { archive, entry, .. }
            | Self::ZipEntrySkippedUnsafePath { archive, entry } => {
                Some(format!("{}::{}", path(archive), entry))
            }
            Self::ZipExtractFailed { archive, entry, .. } => Some(match entry {
                Some(entry) => format!("{}::{}", path(archive), entry),
                None => path(archive),
            }),
            Self::ZipExtractionBudgetExceeded { archive, .. }
            | Self::ZipNestedDepthExceeded { archive, .. }
            | Self::ZipEmptyAfterExtraction { archive } => Some(path(archive)),
            Self::PdfEmptyBatch { .. }
            | Self::DocxEmptyBatch { .. }
            | Self::WordConversionNoOutputs { .. }
            | Self::EmailThreadExceedsBatchCap { .. }
            | Self::EmailThreadExceedsWordCap { .. } => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::PdfStatFailed { .. } => {
                "Could not determine PDF file size; using max batch size for pre-allocation".into()
            }
            Self::PdfExceedsWordCap { batch_limit_words, .. } => format!(
                "PDF exceeds word limit ({}); writing dedicated batch file",
                batch_limit_words
            ),
            Self::PdfEncrypted { .. } => {
                "PDF is password-protected and cannot be merged; skipping".into()
            }
            Self::PdfNoPages { .. } => "PDF contained zero readable pages".into(),
            Self::PdfConversionEmpty { .. } => "Fallback conversion produced zero pages".into(),
            Self::PdfConversionFailed { .. } => {
                "Could not merge file after fallback conversion".into()
            }
            Self::PdfUnreadable { .. } => {
                "Could not read PDF file and fallback conversion failed".into()
            }
            Self::PdfEmptyBatch { .. } => {
                "Skipped PDF batch because no readable pages were found".into()
            }
            Self::DocxStatFailed { .. } => {
                "Could not determine document file size; using max batch size for pre-allocation"
                    .into()
            }
            Self::DocxExceedsWordCap { batch_limit_words, .. } => format!(
                "DOCX exceeds word limit ({}); writing dedicated batch file",
                batch_limit_words
            ),
            Self::DocxUnreadable { .. } => "Could not read DOCX/DOC file; skipping file".into(),
            Self::DocxEmptyDocument { .. } => {
                "DOCX file had no readable body elements; skipping file".into()
            }
            Self::DocxAppendFailed { .. } => {
                "Could not append DOCX body elements; skipping file".into()
            }
            Self::DocxEmptyBatch { .. } => {
                "Skipped DOCX batch because no readable documents were found".into()
            }
            Self::WordToPdfTimeout { timeout, .. } => format!(
                "Word conversion timed out after {}s; skipping file",
                timeout
            ),
            Self::WordToPdfFailed { .. } => "Word-to-PDF conversion failed; skipping file".into(),
            Self::WordConversionNoOutputs { .. } => {
                "No Word documents could be converted to PDF in this group".into()
            }
            Self::EmailExtractFailed { .. } => "Could not parse email file; skipping file".into(),
            Self::EmailThreadExceedsBatchCap { .. } => {
                "Email thread exceeds configured batch size cap; writing dedicated batch file"
                    .into()
            }
            Self::EmailThreadExceedsWordCap { batch_limit_words, .. } => format!(
                "Email thread exceeds word limit ({}); writing dedicated batch file",
                batch_limit_words
            ),
            Self::ZipEntrySuspiciousRatio { .. } => {
                "ZIP entry has suspicious compression ratio (possible zip bomb); skipping".into()
            }
            Self::ZipExtractionBudgetExceeded { .. } => {
                "ZIP extraction stopped: total extracted size would exceed safety budget".into()
            }
            Self::ZipEntrySkippedUnsafePath { .. } => "Skipped ZIP entry with unsafe path".into(),
            Self::ZipExtractFailed { entry: Some(_), .. } => {
                "Failed to extract ZIP entry; skipping entry".into()
            }
            Self::ZipExtractFailed { entry: None, .. } => {
                "Failed to extract ZIP archive; skipping archive".into()
            }
            Self::ZipNestedDepthExceeded { .. } => {
                "Nested ZIP archive skipped due to depth limit".into()
            }
            Self::ZipEmptyAfterExtraction { .. } => {
                "ZIP archive did not contain extractable files".into()
            }
            Self::UnsupportedRelocateFailed { .. } => {
                "Failed to relocate unsupported file".into()
            }
            Self::FailedArtifactCreateFailed { .. } => {
                "Failed to create artifact for failed file".into()
            }
        }
    }
}

/// A recorded warning as it appears in the manifest: the kind's fields
/// flattened next to `code` and `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    #[serde(flatten)]
    pub kind: WarningKind,
    pub message: String,
}

impl From<WarningKind> for Warning {
    fn from(kind: WarningKind) -> Self {
        let message = kind.message();
        Self { kind, message }
    }
}

impl Warning {
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// The kind's fields without `code`, for structured log context.
    pub fn context(&self) -> serde_json::Value {
        match serde_json::to_value(&self.kind) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("code");
                serde_json::Value::Object(map)
            }
            _ => serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape() {
        let warning = Warning::from(WarningKind::PdfUnreadable {
            file: PathBuf::from("/in/broken.pdf"),
            error: "invalid header".to_string(),
        });
        let value = serde_json::to_value(&warning).unwrap();

        assert_eq!(value["code"], "pdf_unreadable");
        assert_eq!(value["file"], "/in/broken.pdf");
        assert_eq!(value["error"], "invalid header");
        assert_eq!(
            value["message"],
            "Could not read PDF file and fallback conversion failed"
        );
    }

    #[test]
    fn test_code_matches_serde_tag() {
        let kinds = vec![
            WarningKind::ZipNestedDepthExceeded {
                archive: PathBuf::from("inner.zip"),
                depth: 1,
                depth_limit: 1,
            },
            WarningKind::EmailThreadExceedsWordCap {
                thread_key: "k".into(),
                group: "g".into(),
                thread_words: 60_000,
                batch_limit_words: 50_000,
            },
            WarningKind::UnsupportedRelocateFailed {
                file: PathBuf::from("a.txt"),
                destination: PathBuf::from("out/a.txt"),
                action: TransferAction::Copy,
                reason: "unsupported_input_file_relocated".into(),
                origin: "input".into(),
                error: "denied".into(),
            },
        ];
        for kind in kinds {
            let value = serde_json::to_value(&kind).unwrap();
            assert_eq!(value["code"], kind.code());
        }
    }

    #[test]
    fn test_skip_classification() {
        let skip = WarningKind::ZipEntrySkippedUnsafePath {
            archive: PathBuf::from("a.zip"),
            entry: "../evil.eml".into(),
        };
        let fail = WarningKind::ZipEntrySuspiciousRatio {
            archive: PathBuf::from("a.zip"),
            entry: "bomb.bin".into(),
            ratio: 1000.0,
        };
        assert!(skip.is_skip());
        assert!(!fail.is_skip());
    }

    #[test]
    fn test_source_prefers_entry_reference() {
        let kind = WarningKind::ZipEntrySkippedUnsafePath {
            archive: PathBuf::from("/tmp/a.zip"),
            entry: "../evil.eml".into(),
        };
        assert_eq!(kind.source().as_deref(), Some("/tmp/a.zip::../evil.eml"));

        let whole = WarningKind::ZipExtractFailed {
            archive: PathBuf::from("/tmp/a.zip"),
            entry: None,
            error: "bad".into(),
        };
        assert_eq!(whole.source().as_deref(), Some("/tmp/a.zip"));
    }

    #[test]
    fn test_batch_warnings_have_no_source() {
        let kind = WarningKind::PdfEmptyBatch {
            group: "root".into(),
            batch: 1,
            file_count: 1,
        };
        assert!(kind.source().is_none());
    }

    #[test]
    fn test_stage_is_code_prefix() {
        let kind = WarningKind::FailedArtifactCreateFailed {
            file: PathBuf::from("x.pdf"),
            destination: PathBuf::from("failed/pdf/x.pdf"),
            stage: "pdf".into(),
            action: ArtifactAction::Copy,
            error: "denied".into(),
        };
        assert_eq!(kind.stage(), "failed");
        assert_eq!(
            WarningKind::PdfNoPages { file: PathBuf::from("a.pdf") }.stage(),
            "pdf"
        );
    }

    #[test]
    fn test_context_omits_code() {
        let warning = Warning::from(WarningKind::ZipEmptyAfterExtraction {
            archive: PathBuf::from("empty.zip"),
        });
        let context = warning.context();
        assert!(context.get("code").is_none());
        assert_eq!(context["archive"], "empty.zip");
    }

    #[test]
    fn test_roundtrip_through_manifest_json() {
        let warning = Warning::from(WarningKind::ZipExtractFailed {
            archive: PathBuf::from("a.zip"),
            entry: Some("x.pdf".into()),
            error: "crc".into(),
        });
        let json = serde_json::to_string(&warning).unwrap();
        let back: Warning = serde_json::from_str(&json).unwrap();
        assert_eq!(back, warning);
    }
}

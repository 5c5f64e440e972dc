//! The JSON record of one run, written once to `merge_manifest.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::archive::ExpansionStats;
use crate::email::EmailSummary;
use crate::error::StorageError;
use crate::ledger::{FileOutcome, Warning};
use crate::pipeline::RunState;
use crate::storage::{MovedFile, RelocatedFile};

pub const MANIFEST_FILE_NAME: &str = "merge_manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limits {
    pub max_file_size_kb: u64,
    pub max_output_files: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPaths {
    pub processed_dir: PathBuf,
    pub unprocessed_dir: PathBuf,
    pub failed_dir: PathBuf,
    pub logs_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogPaths {
    pub text_log: PathBuf,
    pub jsonl_log: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub input_files_total: usize,
    pub processed_outputs_total: usize,
    pub moved_unprocessed_total: usize,
    pub unprocessed_relocated_total: usize,
    pub failed_files_total: usize,
    pub failed_artifacts_total: usize,
    pub skipped_files_total: usize,
    pub warnings_total: usize,
    pub errors_total: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Files {
    pub processed_outputs: Vec<PathBuf>,
    pub moved_unprocessed: Vec<MovedFile>,
    pub unprocessed: Vec<RelocatedFile>,
    pub failed: Vec<FileOutcome>,
    pub skipped: Vec<FileOutcome>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WordConversionSummary {
    pub attempted: usize,
    pub converted: usize,
    pub failed: usize,
}

impl WordConversionSummary {
    pub fn merge(&mut self, other: WordConversionSummary) {
        self.attempted += other.attempted;
        self.converted += other.converted;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ZipProcessingSummary {
    pub archives_found: usize,
    #[serde(flatten)]
    pub stats: ExpansionStats,
}

/// A run-fatal error as listed under `errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunErrorRecord {
    pub code: String,
    pub message: String,
    pub error: String,
}

impl RunErrorRecord {
    pub fn unhandled(error: impl ToString) -> Self {
        Self {
            code: "infra_unhandled_error".to_string(),
            message: "Fatal processing error stopped the run".to_string(),
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub timestamp: String,
    pub run_id: String,
    pub status: RunState,
    pub input_path: PathBuf,
    pub total_input_files: usize,
    pub total_output_files: usize,
    pub output_files: Vec<PathBuf>,
    pub limits: Limits,
    pub paths: OutputPaths,
    pub logs: LogPaths,
    pub summary: Summary,
    pub files: Files,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RunErrorRecord>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub output_to_sources: BTreeMap<String, Vec<PathBuf>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_conversion: Option<WordConversionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_processing: Option<ZipProcessingSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emails: Option<EmailSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_write_error: Option<String>,
}

impl Manifest {
    /// Recomputes `summary` and the output totals from the lists.
    pub fn refresh_summary(&mut self, failed_artifacts_total: usize) {
        self.total_output_files = self.output_files.len();
        self.files.processed_outputs = self.output_files.clone();
        self.summary = Summary {
            input_files_total: self.total_input_files,
            processed_outputs_total: self.output_files.len(),
            moved_unprocessed_total: self.files.moved_unprocessed.len(),
            unprocessed_relocated_total: self.files.unprocessed.len(),
            failed_files_total: self.files.failed.len(),
            failed_artifacts_total,
            skipped_files_total: self.files.skipped.len(),
            warnings_total: self.warnings.len(),
            errors_total: self.errors.len(),
        };
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), StorageError> {
        let json = self.to_json().map_err(|e| StorageError::WriteFile {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?;
        std::fs::write(path, json).map_err(|e| StorageError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::WarningKind;
    use tempfile::TempDir;

    fn manifest() -> Manifest {
        Manifest {
            timestamp: "2024-10-01T09:30:00".to_string(),
            run_id: "20241001_093000_abcdef12".to_string(),
            status: RunState::Completed,
            input_path: PathBuf::from("/in"),
            total_input_files: 2,
            total_output_files: 0,
            output_files: vec![PathBuf::from("/out/processed/root_pdf_batch1.pdf")],
            limits: Limits {
                max_file_size_kb: 1024,
                max_output_files: 300,
            },
            paths: OutputPaths {
                processed_dir: PathBuf::from("/out/processed"),
                unprocessed_dir: PathBuf::from("/out/unprocessed"),
                failed_dir: PathBuf::from("/out/failed"),
                logs_dir: PathBuf::from("/out/logs"),
            },
            logs: LogPaths {
                text_log: PathBuf::from("/out/logs/run_x.log"),
                jsonl_log: PathBuf::from("/out/logs/run_x.jsonl"),
            },
            summary: Summary::default(),
            files: Files::default(),
            warnings: Vec::new(),
            errors: Vec::new(),
            output_to_sources: BTreeMap::new(),
            word_conversion: None,
            zip_processing: None,
            emails: None,
            manifest_write_error: None,
        }
    }

    #[test]
    fn test_optional_sections_are_omitted() {
        let mut manifest = manifest();
        manifest.refresh_summary(0);
        let value: serde_json::Value = serde_json::from_str(&manifest.to_json().unwrap()).unwrap();

        assert_eq!(value["status"], "completed");
        assert_eq!(value["total_output_files"], 1);
        assert_eq!(value["summary"]["processed_outputs_total"], 1);
        assert_eq!(value["files"]["processed_outputs"][0], "/out/processed/root_pdf_batch1.pdf");
        for key in [
            "warnings",
            "errors",
            "output_to_sources",
            "word_conversion",
            "zip_processing",
            "emails",
            "manifest_write_error",
        ] {
            assert!(value.get(key).is_none(), "{} should be omitted", key);
        }
    }

    #[test]
    fn test_zip_summary_is_flat() {
        let mut manifest = manifest();
        manifest.zip_processing = Some(ZipProcessingSummary {
            archives_found: 2,
            stats: ExpansionStats {
                archives_extracted: 1,
                archives_failed: 1,
                ..ExpansionStats::default()
            },
        });
        manifest.warnings.push(Warning::from(WarningKind::ZipEmptyAfterExtraction {
            archive: PathBuf::from("/in/empty.zip"),
        }));
        manifest.errors.push(RunErrorRecord::unhandled("boom"));
        manifest.refresh_summary(0);

        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["zip_processing"]["archives_found"], 2);
        assert_eq!(value["zip_processing"]["archives_failed"], 1);
        assert_eq!(value["warnings"][0]["code"], "zip_empty_after_extraction");
        assert_eq!(value["errors"][0]["code"], "infra_unhandled_error");
        assert_eq!(value["summary"]["warnings_total"], 1);
        assert_eq!(value["summary"]["errors_total"], 1);
    }

    #[test]
    fn test_write_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(MANIFEST_FILE_NAME);
        manifest().write_to(&path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["run_id"], "20241001_093000_abcdef12");
        assert_eq!(written["limits"]["max_output_files"], 300);
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let result = manifest().write_to(&dir.path().join("missing/merge_manifest.json"));
        assert!(matches!(result, Err(StorageError::WriteFile { .. })));
    }
}

//! Isolated input/output directories and a merge runner over them.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;

use docmerge::convert::{DocumentConverter, NoConverter};
use docmerge::manifest::MANIFEST_FILE_NAME;
use docmerge::pipeline::NoopProgress;
use docmerge::{CancelFlag, Manifest, MergeOrchestrator, ProgressReporter, Result, RunConfig};

use super::builders::{docx_bytes, pdf_bytes, zip_bytes, EmailBuilder};

pub struct TestHarness {
    temp_dir: TempDir,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub config: RunConfig,
    converter: Arc<dyn DocumentConverter>,
    progress: Arc<dyn ProgressReporter>,
}

impl TestHarness {
    /// Default config and no document converter.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let input_dir = temp_dir.path().join("input");
        let output_dir = temp_dir.path().join("output");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");

        Self {
            temp_dir,
            input_dir,
            output_dir,
            config: RunConfig::default(),
            converter: Arc::new(NoConverter::new("no converter in tests")),
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn with_converter(mut self, converter: Arc<dyn DocumentConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Writes `relative` under the input directory, creating parents.
    pub fn write_input(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.input_dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create input subdir");
        }
        std::fs::write(&path, content).expect("Failed to write input file");
        path
    }

    pub fn write_pdf(&self, relative: &str, pages: &[&str]) -> PathBuf {
        self.write_input(relative, &pdf_bytes(pages))
    }

    pub fn write_docx(&self, relative: &str, paragraphs: &[&str]) -> PathBuf {
        self.write_input(relative, &docx_bytes(paragraphs))
    }

    pub fn write_zip(&self, relative: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        self.write_input(relative, &zip_bytes(entries))
    }

    pub fn write_email(&self, relative: &str, email: &EmailBuilder) -> PathBuf {
        self.write_input(relative, &email.build())
    }

    pub fn orchestrator(&self) -> MergeOrchestrator {
        MergeOrchestrator::new(self.config.clone())
            .with_converter(self.converter.clone())
            .with_progress(self.progress.clone())
    }

    pub fn run(&self) -> Result<Manifest> {
        self.run_input(&self.input_dir)
    }

    pub fn run_input(&self, input: &Path) -> Result<Manifest> {
        self.orchestrator()
            .merge_documents(input, &self.output_dir, &CancelFlag::new())
    }

    pub fn run_with_cancel(&self, cancel: &CancelFlag) -> Result<Manifest> {
        self.orchestrator()
            .merge_documents(&self.input_dir, &self.output_dir, cancel)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.output_dir.join("processed")
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.processed_dir().join(name)
    }

    /// The manifest as written to disk.
    pub fn manifest_json(&self) -> Value {
        self.manifest_json_at(&self.processed_dir().join(MANIFEST_FILE_NAME))
    }

    pub fn manifest_json_at(&self, path: &Path) -> Value {
        let text = std::fs::read_to_string(path).expect("Manifest not written");
        serde_json::from_str(&text).expect("Manifest is not valid JSON")
    }

    pub fn warning_codes(manifest: &Manifest) -> Vec<&'static str> {
        manifest.warnings.iter().map(|w| w.code()).collect()
    }
}

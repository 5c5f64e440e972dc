pub mod docx;
pub mod fallback;
pub mod pdf;

use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::ledger::Ledger;
use crate::packer::{Caps, Measured};

/// What the orchestrator does with an input file, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Pdf,
    Word,
    Email,
    Archive,
    Unsupported,
}

impl ContentKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" | "doc" => Self::Word,
            "eml" | "msg" => Self::Email,
            "zip" => Self::Archive,
            _ => Self::Unsupported,
        }
    }

    pub fn classify(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unsupported)
    }
}

/// One file to merge. `path` is what gets read; `source` is the input file
/// it stands for (they differ for Word documents converted to PDF).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeItem {
    pub path: PathBuf,
    pub source: PathBuf,
    pub title: Option<String>,
}

impl MergeItem {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        Self {
            source: path.clone(),
            path,
            title: None,
        }
    }

    pub fn converted<P: Into<PathBuf>, S: Into<PathBuf>>(path: P, source: S) -> Self {
        let source = source.into();
        let title = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string());
        Self {
            path: path.into(),
            source,
            title,
        }
    }
}

/// Where a batch is written: `{dir}/{group}_{label}_batch{number}.{ext}`.
#[derive(Debug, Clone, Copy)]
pub struct BatchTarget<'a> {
    pub dir: &'a Path,
    pub group: &'a str,
    pub label: &'a str,
    pub number: usize,
}

impl BatchTarget<'_> {
    pub fn path(&self, extension: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_batch{}.{}",
            self.group, self.label, self.number, extension
        ))
    }
}

/// A written batch and the input files whose content it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutput {
    pub path: PathBuf,
    pub sources: Vec<PathBuf>,
}

/// Packs files of one content type into capped batch outputs.
pub trait BatchMerger {
    fn caps(&self) -> Caps;

    /// Byte size and word count per item, recording items that cannot be
    /// measured or are over a cap on their own.
    fn measure(&self, items: &[MergeItem], ledger: &mut Ledger) -> Vec<Measured>;

    /// Writes one batch. Sources that cannot be merged are recorded and left
    /// out; `Ok(None)` means nothing was mergeable and no file was written.
    fn write_batch(
        &self,
        items: &[MergeItem],
        target: BatchTarget<'_>,
        ledger: &mut Ledger,
    ) -> Result<Option<BatchOutput>, StorageError>;
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Local;
use uuid::Uuid;

use crate::config::{OutputConfig, OutputLayout};
use crate::email::EmailSummary;
use crate::error::StorageError;
use crate::ledger::{FileOutcome, Ledger};
use crate::manifest::{RunErrorRecord, WordConversionSummary, ZipProcessingSummary};
use crate::processor::BatchOutput;
use crate::runlog::RunLog;
use crate::storage::{ensure_directory, MovedFile, RelocatedFile};
use crate::tempdirs::ScratchDir;

use super::state::RunState;

/// Output directories of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    pub processed: PathBuf,
    pub unprocessed: PathBuf,
    pub failed: PathBuf,
    pub logs: PathBuf,
}

impl RunLayout {
    /// Structured layout nests processed outputs in their own folder; flat
    /// layout writes them to the output root. The other folders always nest.
    pub fn new(output: &Path, config: &OutputConfig) -> Self {
        let processed = match config.layout {
            OutputLayout::Structured => output.join(&config.processed_subdir),
            OutputLayout::Flat => output.to_path_buf(),
        };
        Self {
            processed,
            unprocessed: output.join(&config.unprocessed_subdir),
            failed: output.join(&config.failed_subdir),
            logs: output.join(&config.logs_subdir),
        }
    }

    pub fn create(&self) -> Result<(), StorageError> {
        for dir in [&self.processed, &self.unprocessed, &self.failed, &self.logs] {
            ensure_directory(dir)?;
        }
        Ok(())
    }
}

/// `YYYYmmdd_HHMMSS_` plus eight hex digits.
pub fn new_run_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Local::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Everything one run accumulates between analysis and the manifest.
pub struct RunContext {
    pub run_id: String,
    pub input_path: PathBuf,
    pub layout: RunLayout,
    pub state: RunState,

    pub ledger: Ledger,
    pub log: RunLog,

    pub total_input_files: usize,
    pub file_count: usize,

    pub output_files: Vec<PathBuf>,
    pub output_to_sources: BTreeMap<String, Vec<PathBuf>>,
    pub unprocessed: Vec<RelocatedFile>,
    pub moved_unprocessed: Vec<MovedFile>,
    pub failed: Vec<FileOutcome>,
    pub skipped: Vec<FileOutcome>,
    pub failed_artifacts_total: usize,
    pub errors: Vec<RunErrorRecord>,

    pub word_conversion: WordConversionSummary,
    pub zip_processing: ZipProcessingSummary,
    pub emails: EmailSummary,

    /// Staged input and extraction roots, removed at finalization.
    pub scratch: Vec<ScratchDir>,
}

impl RunContext {
    pub fn new(run_id: String, input_path: &Path, layout: RunLayout, log: RunLog) -> Self {
        Self {
            run_id,
            input_path: input_path.to_path_buf(),
            layout,
            state: RunState::Analyzing,
            ledger: Ledger::new(),
            log,
            total_input_files: 0,
            file_count: 0,
            output_files: Vec::new(),
            output_to_sources: BTreeMap::new(),
            unprocessed: Vec::new(),
            moved_unprocessed: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            failed_artifacts_total: 0,
            errors: Vec::new(),
            word_conversion: WordConversionSummary::default(),
            zip_processing: ZipProcessingSummary::default(),
            emails: EmailSummary::default(),
            scratch: Vec::new(),
        }
    }

    pub fn record_output(&mut self, output: BatchOutput) {
        self.output_to_sources
            .insert(output.path.display().to_string(), output.sources);
        self.output_files.push(output.path);
    }

    pub fn record_outputs<I: IntoIterator<Item = BatchOutput>>(&mut self, outputs: I) -> usize {
        let mut count = 0;
        for output in outputs {
            self.record_output(output);
            count += 1;
        }
        count
    }

    /// Output slots left under `max_output_files`.
    pub fn remaining_outputs(&self, max_output_files: usize) -> usize {
        max_output_files.saturating_sub(self.output_files.len())
    }
}

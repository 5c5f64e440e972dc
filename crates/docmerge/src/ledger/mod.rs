//! Outcome ledger: the append-only warning list of one run, and the
//! failed/skipped file lists derived from it.

pub mod warning;

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::ArtifactAction;

pub use warning::{Warning, WarningKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    NotCreated,
    SourceMissing,
    Created,
    CopyFailed,
}

/// One failed or skipped input, as listed under `files.failed` and
/// `files.skipped` in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub source: String,
    pub code: String,
    pub message: String,
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_action: Option<ArtifactAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_status: Option<ArtifactStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_destination: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct Outcomes {
    pub failed: Vec<FileOutcome>,
    pub skipped: Vec<FileOutcome>,
}

#[derive(Debug, Default)]
pub struct Ledger {
    warnings: Vec<Warning>,
    synced: usize,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: WarningKind) -> &Warning {
        self.warnings.push(Warning::from(kind));
        &self.warnings[self.warnings.len() - 1]
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Warnings recorded since the previous call. Used to mirror warnings
    /// into the run log without logging any of them twice.
    pub fn take_unsynced(&mut self) -> &[Warning] {
        let start = self.synced;
        self.synced = self.warnings.len();
        &self.warnings[start..]
    }

    /// Partitions source-bearing warnings into failed and skipped lists,
    /// keeping the first occurrence of each `(source, code, message, stage)`.
    pub fn derive_outcomes(&self) -> Outcomes {
        let mut outcomes = Outcomes::default();
        let mut seen: HashSet<(String, &'static str, &str, &'static str)> = HashSet::new();

        for warning in &self.warnings {
            let Some(source) = warning.kind.source() else {
                continue;
            };
            let code = warning.kind.code();
            let stage = warning.kind.stage();
            if !seen.insert((source.clone(), code, warning.message.as_str(), stage)) {
                continue;
            }

            let outcome = FileOutcome {
                source,
                code: code.to_string(),
                message: warning.message.clone(),
                stage: stage.to_string(),
                artifact_action: None,
                artifact_status: None,
                artifact_destination: None,
            };
            if warning.kind.is_skip() {
                outcomes.skipped.push(outcome);
            } else {
                outcomes.failed.push(outcome);
            }
        }

        outcomes
    }
}

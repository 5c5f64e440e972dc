use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{ArtifactAction, TransferAction};
use crate::error::StorageError;
use crate::ledger::{ArtifactStatus, FileOutcome, Ledger, WarningKind};
use crate::sanitize::{redact_path, split_extension, truncate_leaf_name};

/// Leaf-name limit for relocated files and failed artifacts.
pub const MAX_RELOCATED_NAME_LEN: usize = 120;
const MAX_UNIQUE_ATTEMPTS: usize = 100_000;

/// Move a file from `src` to `dst`. Uses `rename` first (fast, atomic on same
/// filesystem). Falls back to copy + delete when rename fails; this handles
/// cross-device moves. A copy whose source cannot be deleted is removed again.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    complete_move(src, dst, std::fs::remove_file(src))
}

/// Settles a copy-based move given the outcome of deleting its source.
fn complete_move(
    src: &Path,
    dst: &Path,
    removal: std::io::Result<()>,
) -> Result<(), StorageError> {
    let Err(e) = removal else {
        return Ok(());
    };
    if let Err(cleanup) = std::fs::remove_file(dst) {
        warn!("Failed to remove partial move target {}: {}", dst.display(), cleanup);
    }
    Err(StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })
}

fn copy_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    std::fs::copy(src, dst).map_err(|e| StorageError::CopyFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

pub fn transfer_file(src: &Path, dst: &Path, action: TransferAction) -> Result<(), StorageError> {
    match action {
        TransferAction::Copy => copy_file(src, dst),
        TransferAction::Move => move_file(src, dst),
    }
}

pub fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// `path` itself when free, otherwise the first free `{base}_{n}{ext}` with
/// `n` counting from 1. Broken symlinks count as taken.
pub fn unique_destination(path: &Path) -> Result<PathBuf, StorageError> {
    if std::fs::symlink_metadata(path).is_err() {
        return Ok(path.to_path_buf());
    }

    let directory = path.parent().unwrap_or_else(|| Path::new(""));
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let (base, ext) = split_extension(&filename);

    for counter in 1..MAX_UNIQUE_ATTEMPTS {
        let candidate = directory.join(format!("{}_{}{}", base, counter, ext));
        if std::fs::symlink_metadata(&candidate).is_err() {
            return Ok(candidate);
        }
    }

    Err(StorageError::FileExists(path.to_path_buf()))
}

fn flattened_destination(dir: &Path, source: &Path) -> Result<PathBuf, StorageError> {
    let leaf = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    ensure_directory(dir)?;
    unique_destination(&dir.join(truncate_leaf_name(&leaf, MAX_RELOCATED_NAME_LEN, true)))
}

/// One entry of `files.unprocessed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelocatedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub action: TransferAction,
    pub reason: String,
    pub origin: String,
    pub stage: String,
}

/// One entry of `files.moved_unprocessed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub reason: String,
}

impl From<&RelocatedFile> for MovedFile {
    fn from(file: &RelocatedFile) -> Self {
        Self {
            source: file.source.clone(),
            destination: file.destination.clone(),
            reason: file.reason.clone(),
        }
    }
}

/// Where and why unsupported files are relocated.
#[derive(Debug, Clone, Copy)]
pub struct Relocation<'a> {
    pub target: &'a Path,
    pub action: TransferAction,
    pub reason: &'a str,
    pub origin: &'a str,
}

/// Copies or moves each file flat into `relocation.target`, in sorted order.
/// Failures are recorded as `unsupported_relocate_failed` and leave the
/// source where it was.
pub fn relocate_files(
    files: &[PathBuf],
    relocation: Relocation<'_>,
    ledger: &mut Ledger,
) -> Vec<RelocatedFile> {
    let mut sorted: Vec<&PathBuf> = files.iter().collect();
    sorted.sort();

    let mut relocated = Vec::with_capacity(sorted.len());
    for source in sorted {
        let mut destination = None;
        let result = flattened_destination(relocation.target, source).and_then(|dst| {
            destination = Some(dst.clone());
            transfer_file(source, &dst, relocation.action)
        });

        match (result, destination) {
            (Ok(()), Some(destination)) => {
                debug!(
                    source = %redact_path(source),
                    destination = %redact_path(&destination),
                    "Relocated unsupported file"
                );
                relocated.push(RelocatedFile {
                    source: source.clone(),
                    destination,
                    action: relocation.action,
                    reason: relocation.reason.to_string(),
                    origin: relocation.origin.to_string(),
                    stage: "classification".to_string(),
                });
            }
            (result, destination) => {
                let error = result.err().map(|e| e.to_string()).unwrap_or_default();
                warn!(source = %redact_path(source), error = %error, "Failed to relocate unsupported file");
                ledger.record(WarningKind::UnsupportedRelocateFailed {
                    file: source.clone(),
                    destination: destination.unwrap_or_else(|| relocation.target.to_path_buf()),
                    action: relocation.action,
                    reason: relocation.reason.to_string(),
                    origin: relocation.origin.to_string(),
                    error,
                });
            }
        }
    }
    relocated
}

/// Fills the artifact fields of every failed outcome and, unless disabled or
/// metadata-only, copies or moves the source into `failed_root/<stage>/`.
/// Returns the number of artifacts created.
pub fn materialize_failed_artifacts(
    failed: &mut [FileOutcome],
    failed_root: &Path,
    action: ArtifactAction,
    include_artifacts: bool,
    ledger: &mut Ledger,
) -> usize {
    let transfer = match action {
        ArtifactAction::Copy => Some(TransferAction::Copy),
        ArtifactAction::Move => Some(TransferAction::Move),
        ArtifactAction::MetadataOnly => None,
    };

    let mut created = 0;
    for item in failed.iter_mut() {
        item.artifact_action = Some(action);
        item.artifact_status = Some(ArtifactStatus::NotCreated);
        let Some(transfer) = transfer.filter(|_| include_artifacts) else {
            continue;
        };

        let source = PathBuf::from(&item.source);
        if item.source.contains("::") || !source.is_file() {
            item.artifact_status = Some(ArtifactStatus::SourceMissing);
            continue;
        }

        let stage = if item.stage.is_empty() {
            "unknown"
        } else {
            item.stage.as_str()
        };
        let stage_dir = failed_root.join(stage);
        let result = flattened_destination(&stage_dir, &source).and_then(|destination| {
            item.artifact_destination = Some(destination.clone());
            transfer_file(&source, &destination, transfer)
        });

        match result {
            Ok(()) => {
                item.artifact_status = Some(ArtifactStatus::Created);
                created += 1;
            }
            Err(e) => {
                item.artifact_status = Some(ArtifactStatus::CopyFailed);
                ledger.record(WarningKind::FailedArtifactCreateFailed {
                    file: source.clone(),
                    destination: item
                        .artifact_destination
                        .clone()
                        .unwrap_or_else(|| stage_dir.clone()),
                    stage: stage.to_string(),
                    action,
                    error: e.to_string(),
                });
            }
        }
    }
    created
}

//! ZIP expansion with traversal, ratio and budget defenses.
//!
//! Nested archives are handled with an explicit worklist rather than
//! recursion so the depth limit is a plain counter comparison.

pub mod paths;

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ZipConfig;
use crate::error::ArchiveError;
use crate::ledger::{Ledger, WarningKind};
use crate::sanitize::truncate_leaf_name;

pub use paths::{is_archive_name, safe_member_path, unique_member_path};

/// Uncompressed-to-compressed ratio above which an entry is treated as a
/// likely zip bomb.
pub const MAX_COMPRESSION_RATIO: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionStats {
    pub archives_extracted: usize,
    pub archives_failed: usize,
    pub entries_total: usize,
    pub entries_extracted: usize,
    pub entries_renamed: usize,
    pub entries_skipped_unsafe_path: usize,
    pub nested_archives_extracted: usize,
    pub nested_archives_skipped_depth: usize,
}

impl ExpansionStats {
    pub fn merge(&mut self, other: &ExpansionStats) {
        self.archives_extracted += other.archives_extracted;
        self.archives_failed += other.archives_failed;
        self.entries_total += other.entries_total;
        self.entries_extracted += other.entries_extracted;
        self.entries_renamed += other.entries_renamed;
        self.entries_skipped_unsafe_path += other.entries_skipped_unsafe_path;
        self.nested_archives_extracted += other.nested_archives_extracted;
        self.nested_archives_skipped_depth += other.nested_archives_skipped_depth;
    }
}

#[derive(Debug, Default)]
pub struct ExpansionReport {
    pub stats: ExpansionStats,
    /// Every extracted non-archive file, across all nesting levels.
    pub extracted_files: Vec<PathBuf>,
}

struct Pending {
    archive: PathBuf,
    target: PathBuf,
    depth: usize,
}

pub struct ZipExpander {
    max_filename_length: usize,
    include_extension_in_limit: bool,
    nested_depth_limit: usize,
    max_extract_bytes: u64,
}

impl ZipExpander {
    pub fn new(config: &ZipConfig) -> Self {
        Self {
            max_filename_length: config.max_filename_length,
            include_extension_in_limit: config.include_extension_in_limit,
            nested_depth_limit: config.nested_depth_limit,
            max_extract_bytes: config.max_extract_bytes,
        }
    }

    /// Extracts `zip_path` into `target`, expanding nested archives up to the
    /// depth limit. Per-entry and per-archive problems become warnings; only
    /// an exhausted rename search is returned as an error.
    pub fn expand(
        &self,
        zip_path: &Path,
        target: &Path,
        ledger: &mut Ledger,
    ) -> Result<ExpansionReport, ArchiveError> {
        let mut report = ExpansionReport::default();
        let mut extracted_bytes: u64 = 0;
        let mut worklist = vec![Pending {
            archive: zip_path.to_path_buf(),
            target: target.to_path_buf(),
            depth: 0,
        }];

        while let Some(pending) = worklist.pop() {
            if pending.depth > 0 {
                report.stats.nested_archives_extracted += 1;
            }

            let outcome = self.extract_one(&pending, &mut extracted_bytes, &mut report, ledger)?;
            let nested = match outcome {
                ArchiveOutcome::Done { nested } => nested,
                ArchiveOutcome::Failed => continue,
                ArchiveOutcome::BudgetExceeded => {
                    worklist.clear();
                    break;
                }
            };

            if pending.depth < self.nested_depth_limit {
                for archive in nested.into_iter().rev() {
                    let nested_target = pending
                        .target
                        .join(format!("_nested_{}", Uuid::new_v4().simple()));
                    worklist.push(Pending {
                        archive,
                        target: nested_target,
                        depth: pending.depth + 1,
                    });
                }
            } else {
                for archive in nested {
                    report.stats.nested_archives_skipped_depth += 1;
                    ledger.record(WarningKind::ZipNestedDepthExceeded {
                        archive,
                        depth: pending.depth,
                        depth_limit: self.nested_depth_limit,
                    });
                }
            }
        }

        info!(
            archive = %crate::sanitize::redact_path(zip_path),
            files = report.extracted_files.len(),
            "Expanded archive"
        );
        Ok(report)
    }

    fn extract_one(
        &self,
        pending: &Pending,
        extracted_bytes: &mut u64,
        report: &mut ExpansionReport,
        ledger: &mut Ledger,
    ) -> Result<ArchiveOutcome, ArchiveError> {
        let archive_path = &pending.archive;
        let mut archive = match open_archive(archive_path, &pending.target) {
            Ok(archive) => archive,
            Err(error) => {
                report.stats.archives_failed += 1;
                ledger.record(WarningKind::ZipExtractFailed {
                    archive: archive_path.clone(),
                    entry: None,
                    error,
                });
                return Ok(ArchiveOutcome::Failed);
            }
        };
        report.stats.archives_extracted += 1;

        let mut used: HashSet<String> = HashSet::new();
        let mut nested = Vec::new();

        for index in 0..archive.len() {
            let mut entry = match archive.by_index(index) {
                Ok(entry) => entry,
                Err(e) => {
                    ledger.record(WarningKind::ZipExtractFailed {
                        archive: archive_path.clone(),
                        entry: Some(format!("#{}", index)),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let name = entry.name().to_string();
            let size = entry.size();

            if self.max_extract_bytes > 0 && size > 0 {
                let ratio = size as f64 / entry.compressed_size().max(1) as f64;
                if ratio > MAX_COMPRESSION_RATIO {
                    ledger.record(WarningKind::ZipEntrySuspiciousRatio {
                        archive: archive_path.clone(),
                        entry: name,
                        ratio: (ratio * 10.0).round() / 10.0,
                    });
                    continue;
                }
                if extracted_bytes.saturating_add(size) > self.max_extract_bytes {
                    ledger.record(WarningKind::ZipExtractionBudgetExceeded {
                        archive: archive_path.clone(),
                        budget_bytes: self.max_extract_bytes,
                        extracted_so_far: *extracted_bytes,
                    });
                    return Ok(ArchiveOutcome::BudgetExceeded);
                }
            }

            let Some(member) = safe_member_path(&name) else {
                if !entry.is_dir() {
                    report.stats.entries_total += 1;
                    report.stats.entries_skipped_unsafe_path += 1;
                    ledger.record(WarningKind::ZipEntrySkippedUnsafePath {
                        archive: archive_path.clone(),
                        entry: name,
                    });
                }
                continue;
            };
            if member.ends_with('/') {
                continue;
            }
            report.stats.entries_total += 1;

            let (parent, leaf) = match member.rsplit_once('/') {
                Some((parent, leaf)) => (Some(parent), leaf),
                None => (None, member.as_str()),
            };
            let truncated = truncate_leaf_name(
                leaf,
                self.max_filename_length,
                self.include_extension_in_limit,
            );
            let truncated_renamed = truncated != leaf;
            let candidate = match parent {
                Some(parent) => format!("{}/{}", parent, truncated),
                None => truncated,
            };
            let (relative, collision_renamed) = unique_member_path(
                &candidate,
                &used,
                self.max_filename_length,
                self.include_extension_in_limit,
            )?;
            if truncated_renamed || collision_renamed {
                report.stats.entries_renamed += 1;
            }
            used.insert(relative.clone());

            let destination = relative
                .split('/')
                .fold(pending.target.clone(), |acc, part| acc.join(part));
            match write_entry(&mut entry, size, &destination) {
                Ok(written) => {
                    report.stats.entries_extracted += 1;
                    *extracted_bytes += written;
                }
                Err(e) => {
                    let _ = std::fs::remove_file(&destination);
                    ledger.record(WarningKind::ZipExtractFailed {
                        archive: archive_path.clone(),
                        entry: Some(name),
                        error: e.to_string(),
                    });
                    continue;
                }
            }

            if is_archive_name(&relative) {
                nested.push(destination);
            } else {
                debug!("Extracted {}", relative);
                report.extracted_files.push(destination);
            }
        }

        Ok(ArchiveOutcome::Done { nested })
    }
}

enum ArchiveOutcome {
    Done { nested: Vec<PathBuf> },
    Failed,
    BudgetExceeded,
}

fn open_archive(path: &Path, target: &Path) -> Result<zip::ZipArchive<File>, String> {
    std::fs::create_dir_all(target).map_err(|e| e.to_string())?;
    let file = File::open(path).map_err(|e| e.to_string())?;
    zip::ZipArchive::new(file).map_err(|e| e.to_string())
}

fn write_entry<R: Read>(entry: &mut R, size: u64, destination: &Path) -> std::io::Result<u64> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = File::create(destination)?;
    std::io::copy(&mut entry.take(size), &mut out)
}

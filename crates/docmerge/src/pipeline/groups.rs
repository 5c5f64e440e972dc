//! Turns analyzer groups into processing groups: every archive found in a
//! group is expanded into a group of its own.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info_span};

use crate::archive::ZipExpander;
use crate::config::RunConfig;
use crate::ledger::{Ledger, WarningKind};
use crate::manifest::ZipProcessingSummary;
use crate::processor::ContentKind;
use crate::sanitize::{sanitize_group_component, split_extension};
use crate::tempdirs::ScratchDir;

use super::error::PipelineError;

const MAX_GROUP_NAME_ATTEMPTS: usize = 100_000;

/// Groups ready for classification.
#[derive(Debug, Default)]
pub struct PreparedGroups {
    pub groups: BTreeMap<String, Vec<PathBuf>>,
    /// Input files each group stands for; an archive counts as one.
    pub weights: BTreeMap<String, usize>,
    /// Groups whose files came out of an archive.
    pub archive_groups: HashSet<String>,
    pub summary: ZipProcessingSummary,
    /// Extraction roots, removed when dropped.
    pub scratch: Vec<ScratchDir>,
}

/// `{group}_{stem}` with the stem sanitized, suffixed `_2`, `_3`, ... until
/// it is not in `used`.
pub fn allocate_group_name(
    group: &str,
    archive: &Path,
    used: &BTreeSet<String>,
) -> Result<String, PipelineError> {
    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let (stem, _) = split_extension(&file_name);
    let component = sanitize_group_component(stem);
    let base = if group.is_empty() {
        component
    } else {
        format!("{}_{}", group, component)
    };

    if !used.contains(&base) {
        return Ok(base);
    }
    (2..MAX_GROUP_NAME_ATTEMPTS)
        .map(|counter| format!("{}_{}", base, counter))
        .find(|candidate| !used.contains(candidate))
        .ok_or_else(|| PipelineError::GroupNamesExhausted(archive.to_path_buf()))
}

/// Expands archives into their own groups. With archive processing disabled
/// archives are dropped from the groups but still weigh one input file each.
pub fn expand_archives(
    groups: BTreeMap<String, Vec<PathBuf>>,
    config: &RunConfig,
    ledger: &mut Ledger,
) -> Result<PreparedGroups, PipelineError> {
    let _span = info_span!("expand_archives").entered();

    let expander = ZipExpander::new(&config.zip);
    let mut used: BTreeSet<String> = groups.keys().cloned().collect();
    let mut prepared = PreparedGroups::default();

    for (group, mut files) in groups {
        files.sort();
        let (archives, others): (Vec<PathBuf>, Vec<PathBuf>) = files
            .into_iter()
            .partition(|path| ContentKind::classify(path) == ContentKind::Archive);

        if !others.is_empty() {
            *prepared.weights.entry(group.clone()).or_default() += others.len();
            prepared.groups.entry(group.clone()).or_default().extend(others);
        }

        if !config.process_zip_archives {
            *prepared.weights.entry(group.clone()).or_default() += archives.len();
            continue;
        }

        for archive in archives {
            prepared.summary.archives_found += 1;
            let archive_group = allocate_group_name(&group, &archive, &used)?;
            used.insert(archive_group.clone());
            *prepared.weights.entry(archive_group.clone()).or_default() += 1;

            let scratch = match ScratchDir::new("docmerge_zip_extract_") {
                Ok(scratch) => scratch,
                Err(e) => {
                    prepared.summary.stats.archives_failed += 1;
                    ledger.record(WarningKind::ZipExtractFailed {
                        archive: archive.clone(),
                        entry: None,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let report = expander.expand(&archive, scratch.path(), ledger)?;
            prepared.summary.stats.merge(&report.stats);
            prepared.scratch.push(scratch);

            if report.extracted_files.is_empty() {
                ledger.record(WarningKind::ZipEmptyAfterExtraction { archive });
                continue;
            }

            debug!(
                group = %archive_group,
                files = report.extracted_files.len(),
                "Archive group prepared"
            );
            prepared.archive_groups.insert(archive_group.clone());
            prepared
                .groups
                .entry(archive_group)
                .or_default()
                .extend(report.extracted_files);
        }
    }

    for files in prepared.groups.values_mut() {
        files.sort();
    }
    Ok(prepared)
}

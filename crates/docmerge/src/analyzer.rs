use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

use crate::sanitize::comparable_path;

pub const ROOT_GROUP: &str = "root";

/// Walks an input tree and buckets its files by top-level folder.
pub struct FolderAnalyzer {
    root: PathBuf,
    excludes: Vec<PathBuf>,
}

impl FolderAnalyzer {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            excludes: Vec::new(),
        }
    }

    /// Excluded directories are matched case-insensitively on whole path
    /// components and pruned together with everything beneath them.
    pub fn with_excludes<I, P>(mut self, excludes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.excludes = excludes.into_iter().map(|p| comparable_path(p.as_ref())).collect();
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        if self.excludes.is_empty() {
            return false;
        }
        let candidate = comparable_path(path);
        self.excludes.iter().any(|ex| candidate.starts_with(ex))
    }

    /// Group name to sorted file list. Files directly under the root map to
    /// `root`; anything deeper maps to its first-level folder name.
    pub fn analyze(&self) -> BTreeMap<String, Vec<PathBuf>> {
        let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                let excluded = self.is_excluded(entry.path());
                if excluded {
                    debug!("Excluding {}", entry.path().display());
                }
                !excluded
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let group = path
                .strip_prefix(&self.root)
                .ok()
                .and_then(|rel| rel.parent())
                .and_then(|parent| parent.components().next())
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .unwrap_or_else(|| ROOT_GROUP.to_string());

            groups.entry(group).or_default().push(path.to_path_buf());
        }

        for files in groups.values_mut() {
            files.sort();
        }

        info!(
            "Analyzed {} files in {} groups under {}",
            groups.values().map(Vec::len).sum::<usize>(),
            groups.len(),
            self.root.display()
        );
        groups
    }
}

//! Entry-name handling for ZIP extraction: traversal checks, leaf
//! truncation and collision-free renaming.

use std::collections::HashSet;

use crate::error::ArchiveError;
use crate::sanitize::{split_extension, suffixed_leaf_name};

/// Attempts before a collision search is abandoned.
pub const MAX_RENAME_ATTEMPTS: usize = 100_000;

/// Normalizes a raw member name to a relative `/`-separated path.
///
/// Returns `None` for absolute paths, drive-letter paths, any `..` segment,
/// and names with no real segments. Directory entries keep their trailing
/// slash.
pub fn safe_member_path(member_name: &str) -> Option<String> {
    if member_name.is_empty() {
        return None;
    }

    let normalized = member_name.replace('\\', "/");
    if normalized.starts_with('/') {
        return None;
    }
    let mut chars = normalized.chars();
    if let (Some(first), Some(':')) = (chars.next(), chars.next()) {
        if first.is_ascii_alphabetic() {
            return None;
        }
    }

    let mut parts = Vec::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return None;
    }

    let mut safe = parts.join("/");
    if normalized.ends_with('/') {
        safe.push('/');
    }
    Some(safe)
}

/// Returns `candidate` if unused, otherwise the first `_N`-suffixed variant
/// of its leaf that is free. The flag reports whether a suffix was added.
pub fn unique_member_path(
    candidate: &str,
    used: &HashSet<String>,
    max_len: usize,
    include_ext: bool,
) -> Result<(String, bool), ArchiveError> {
    if !used.contains(candidate) {
        return Ok((candidate.to_string(), false));
    }

    let (dir_prefix, leaf) = match candidate.rsplit_once('/') {
        Some((dir, leaf)) => (Some(dir), leaf),
        None => (None, candidate),
    };

    for counter in 1..MAX_RENAME_ATTEMPTS {
        let next_leaf = suffixed_leaf_name(leaf, &format!("_{}", counter), max_len, include_ext);
        let next = match dir_prefix {
            Some(dir) => format!("{}/{}", dir, next_leaf),
            None => next_leaf,
        };
        if !used.contains(&next) {
            return Ok((next, true));
        }
    }

    Err(ArchiveError::NameSpaceExhausted(candidate.to_string()))
}

/// True for names that should be expanded as nested archives.
pub fn is_archive_name(name: &str) -> bool {
    split_extension(name).1.eq_ignore_ascii_case(".zip")
}

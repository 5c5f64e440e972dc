//! Name and path helpers shared by the archive expander, relocation and the
//! run log.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

static RE_GROUP_UNSAFE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]+").unwrap());

/// Returns only the filename component of a path (no directory).
///
/// Used for redacted log fields and for `Source:` lines in email output.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Absolute, lowercased form of `path` with `.` dropped and `..` resolved
/// lexically. Symlinks are not followed.
pub fn comparable_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    PathBuf::from(resolved.to_string_lossy().to_lowercase())
}

/// Case-insensitive, whole-component check that `path` is `root` or lies
/// beneath it.
pub fn path_is_within(path: &Path, root: &Path) -> bool {
    comparable_path(path).starts_with(comparable_path(root))
}

/// Splits a file name into base and extension, keeping the dot on the
/// extension. Leading dots belong to the base, so `.profile` has no
/// extension and `archive.tar.gz` splits as `archive.tar` + `.gz`.
pub fn split_extension(name: &str) -> (&str, &str) {
    let leading = name.len() - name.trim_start_matches('.').len();
    match name[leading..].rfind('.') {
        Some(pos) => name.split_at(leading + pos),
        None => (name, ""),
    }
}

fn take_chars(s: &str, count: usize) -> &str {
    match s.char_indices().nth(count) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Truncates the base of `name` so the result fits in `max_len` characters.
///
/// With `include_ext` the extension counts toward the limit (the base keeps
/// at least one character); without it only the base is limited. A zero
/// limit disables truncation.
pub fn truncate_leaf_name(name: &str, max_len: usize, include_ext: bool) -> String {
    if max_len == 0 {
        return name.to_string();
    }

    let (base, ext) = split_extension(name);
    let allowed_base = if include_ext {
        max_len.saturating_sub(ext.chars().count()).max(1)
    } else {
        max_len
    };

    format!("{}{}", take_chars(base, allowed_base), ext)
}

/// Same as [`truncate_leaf_name`] with a numeric suffix inserted before the
/// extension; the suffix also counts toward the limit.
pub fn suffixed_leaf_name(name: &str, suffix: &str, max_len: usize, include_ext: bool) -> String {
    let (base, ext) = split_extension(name);
    let base = if max_len == 0 {
        base
    } else {
        let reserved = suffix.chars().count() + if include_ext { ext.chars().count() } else { 0 };
        take_chars(base, max_len.saturating_sub(reserved).max(1))
    };
    format!("{}{}{}", base, suffix, ext)
}

/// Turns an archive stem into a group-name component.
pub fn sanitize_group_component(value: &str) -> String {
    let normalized = RE_GROUP_UNSAFE.replace_all(value, "_");
    let trimmed = normalized.trim_matches('_');
    if trimmed.is_empty() {
        "zip".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/home/user/Documents/invoice.pdf")),
            "invoice.pdf"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("report.pdf"), ("report", ".pdf"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension(".profile"), (".profile", ""));
        assert_eq!(split_extension("..hidden.txt"), ("..hidden", ".txt"));
        assert_eq!(split_extension("README"), ("README", ""));
    }

    #[test]
    fn test_truncate_counts_extension() {
        let name = format!("{}.eml", "a".repeat(60));
        let truncated = truncate_leaf_name(&name, 50, true);
        assert_eq!(truncated.chars().count(), 50);
        assert!(truncated.ends_with(".eml"));
    }

    #[test]
    fn test_truncate_excluding_extension() {
        let name = format!("{}.eml", "a".repeat(60));
        let truncated = truncate_leaf_name(&name, 50, false);
        assert_eq!(truncated, format!("{}.eml", "a".repeat(50)));
    }

    #[test]
    fn test_truncate_keeps_one_base_char() {
        assert_eq!(truncate_leaf_name("abcdef.longextension", 4, true), "a.longextension");
    }

    #[test]
    fn test_truncate_short_name_unchanged() {
        assert_eq!(truncate_leaf_name("short.pdf", 50, true), "short.pdf");
        assert_eq!(truncate_leaf_name("whatever.pdf", 0, true), "whatever.pdf");
    }

    #[test]
    fn test_truncate_multibyte_on_char_boundary() {
        let name = format!("{}.txt", "ü".repeat(20));
        let truncated = truncate_leaf_name(&name, 10, true);
        assert_eq!(truncated, format!("{}.txt", "ü".repeat(6)));
    }

    #[test]
    fn test_suffixed_leaf_respects_limit() {
        let name = format!("{}.eml", "b".repeat(46));
        let renamed = suffixed_leaf_name(&name, "_12", 50, true);
        assert_eq!(renamed.chars().count(), 50);
        assert!(renamed.ends_with("_12.eml"));
    }

    #[test]
    fn test_sanitize_group_component() {
        assert_eq!(sanitize_group_component("Bundle 2024 (final)"), "Bundle_2024_final");
        assert_eq!(sanitize_group_component("__x__"), "x");
        assert_eq!(sanitize_group_component("!!!"), "zip");
        assert_eq!(sanitize_group_component("ok-name_1"), "ok-name_1");
    }

    #[test]
    fn test_comparable_path_resolves_dot_components() {
        assert_eq!(
            comparable_path(Path::new("/Data/In/sub/../Out/./x")),
            PathBuf::from("/data/in/out/x")
        );
        assert_eq!(comparable_path(Path::new("/a/../../b")), PathBuf::from("/b"));
    }

    #[test]
    fn test_path_is_within() {
        assert!(path_is_within(Path::new("/data/in/out"), Path::new("/data/in")));
        assert!(path_is_within(Path::new("/data/in"), Path::new("/data/in")));
        assert!(path_is_within(Path::new("/Data/IN/out"), Path::new("/data/in")));
        assert!(path_is_within(Path::new("/data/in/sub/../out"), Path::new("/data/in")));
        assert!(!path_is_within(Path::new("/data/in/../out"), Path::new("/data/in")));
        assert!(!path_is_within(Path::new("/data/input2"), Path::new("/data/in")));
        assert!(!path_is_within(Path::new("/data/out"), Path::new("/data/in")));
    }
}

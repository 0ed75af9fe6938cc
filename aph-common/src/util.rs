//! Shared path utilities for APH.

use std::path::{Component, Path, PathBuf};

/// Lexically clean a path: drop `.` components, fold `..`, and strip any
/// trailing slash. Relative paths are made absolute against the current
/// directory first.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    };
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        PathBuf::from("/")
    } else {
        normalized
    }
}

/// Whether two window names refer to the same path.
pub fn same_path(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return a == b;
    }
    normalize_path(Path::new(a)) == normalize_path(Path::new(b))
}

/// Directory containing `file`, or `.` for a bare name.
pub fn parent_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `file` relative to `root`, resolving symlinks in `file` first.
///
/// Files outside the root are returned unchanged.
pub fn relative_to_root(root: &Path, file: &Path) -> PathBuf {
    let resolved = std::fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
    match resolved.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
        _ => match file.strip_prefix(root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => file.to_path_buf(),
        },
    }
}

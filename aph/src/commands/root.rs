//! `aph root [PATH]`: print the project root.

use std::path::{Path, PathBuf};

use aph_common::RootResolver;
use aph_common::util::normalize_path;

/// Root for `path` (a file or a directory), defaulting to the current
/// directory.
pub fn run(resolver: &RootResolver, path: Option<&Path>) -> PathBuf {
    let path = normalize_path(path.unwrap_or(Path::new(".")));
    if path.is_dir() {
        resolver.resolve_dir(&path)
    } else {
        resolver.resolve(&path)
    }
}

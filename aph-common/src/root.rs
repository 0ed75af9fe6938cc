//! Project root resolution.
//!
//! The root is whatever the configured resolver prints when run in the
//! file's directory. Any failure falls back to that directory.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::util::parent_dir;

/// Runs an external command to find a file's project root.
#[derive(Debug, Clone)]
pub struct RootResolver {
    command: String,
    args: Vec<String>,
}

impl RootResolver {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Root of the project containing `file`.
    ///
    /// Recomputed on every call. Trailing newlines are trimmed and symlinks
    /// resolved; if resolving fails the trimmed output is used as is.
    pub fn resolve(&self, file: &Path) -> PathBuf {
        self.resolve_dir(&parent_dir(file))
    }

    /// Root of the project containing directory `dir`.
    pub fn resolve_dir(&self, dir: &Path) -> PathBuf {
        self.run(dir).unwrap_or_else(|| dir.to_path_buf())
    }

    fn run(&self, dir: &Path) -> Option<PathBuf> {
        let output = match Command::new(&self.command)
            .args(&self.args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                warn!("Root resolver {} failed to start in {:?}: {}", self.command, dir, e);
                return None;
            }
        };
        if !output.status.success() {
            debug!(
                "Root resolver {} exited with {} in {:?}",
                self.command, output.status, dir
            );
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let trimmed = stdout.trim_matches('\n');
        if trimmed.is_empty() {
            debug!("Root resolver {} printed nothing in {:?}", self.command, dir);
            return None;
        }
        let root = PathBuf::from(trimmed);
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        debug!("Resolved root for {:?}: {:?}", dir, root);
        Some(root)
    }
}

impl Default for RootResolver {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

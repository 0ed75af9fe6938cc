//! Test support shared by the workspace's test suites.

mod fake_acme;
pub mod log;

pub use fake_acme::FakeAcme;
pub use log::{TestLogEntry, TestLogger, TestPhase, init_global_test_logging};

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable script `name` into `dir` and return its path.
///
/// Panics if the file cannot be written; only meant for tests.
#[track_caller]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let written = std::fs::write(&path, body).and_then(|()| {
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
    });
    if let Err(e) = written {
        panic!("cannot write script {}: {e}", path.display());
    }
    path
}

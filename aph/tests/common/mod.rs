pub mod logging;

pub use logging::init_test_logging;

use std::path::Path;
use std::process::Command;

/// `aph` with configuration isolated under `home` and no acme environment.
pub fn aph(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_aph"));
    cmd.env("XDG_CONFIG_HOME", home)
        .env_remove("winid")
        .env_remove("%");
    for (var, _) in std::env::vars() {
        if var.starts_with("APH_") {
            cmd.env_remove(var);
        }
    }
    cmd
}

pub fn assert_contains(haystack: &str, needle: &str) {
    assert!(
        haystack.contains(needle),
        "Expected to find '{needle}' in output, got: {haystack}"
    );
}

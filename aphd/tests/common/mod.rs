pub mod logging;

pub use logging::init_test_logging;

use std::path::Path;
use std::process::Command;

/// `aphd` with configuration isolated under `home`.
pub fn aphd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_aphd"));
    cmd.env("XDG_CONFIG_HOME", home)
        .env_remove("APH_CONFIG")
        .env_remove("APH_TRANSPORT")
        .env_remove("APH_MOUNT")
        .env_remove("APH_NAMESPACE")
        .env_remove("APH_LOG_FILE");
    cmd
}

//! `aph config` output.

use crate::common::{aph, assert_contains, init_test_logging};
use tempfile::TempDir;

#[test]
fn test_default_config_toml() {
    init_test_logging();
    crate::test_log!("TEST START: test_default_config_toml");

    let home = TempDir::new().unwrap();
    let output = aph(home.path()).arg("config").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "ignore_marker = \"NoAph\"");
    assert_contains(&stdout, "command = \"acme-format\"");
    assert_contains(&stdout, "# Loaded from: built-in defaults");

    crate::test_log!("TEST PASS: test_default_config_toml");
}

#[test]
fn test_config_file_and_env_sources_in_json() {
    init_test_logging();
    let home = TempDir::new().unwrap();
    let dir = home.path().join("aph");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("config.toml"),
        "[stages.test]\nenabled = false\n",
    )
    .unwrap();

    let output = aph(home.path())
        .env("APH_IGNORE_MARKER", "Quiet")
        .args(["config", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["config"]["watch"]["ignore_marker"], "Quiet");
    assert_eq!(value["config"]["stages"]["test"]["enabled"], false);
    assert_eq!(value["sources"]["watch.ignore_marker"]["kind"], "env");
    assert_eq!(value["sources"]["stages.test.enabled"]["kind"], "file");
}

#[test]
fn test_cli_mount_flag_is_a_source() {
    init_test_logging();
    let home = TempDir::new().unwrap();
    let output = aph(home.path())
        .args(["--mount", "/n/acme", "config", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["config"]["acme"]["transport"], "mount");
    assert_eq!(value["sources"]["acme.mount"]["kind"], "cli");
}

#[test]
fn test_invalid_env_is_reported() {
    init_test_logging();
    let home = TempDir::new().unwrap();
    let output = aph(home.path())
        .env("APH_REWRITE", "sideways")
        .arg("config")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "APH_REWRITE");
    assert_contains(&stderr, "[APH-E004]");
}

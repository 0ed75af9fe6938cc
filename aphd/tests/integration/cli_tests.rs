//! Command-line behavior of the daemon binary.

use crate::common::aphd;
use tempfile::TempDir;

#[test]
fn test_help_lists_flags() {
    crate::test_log!("TEST START: test_help_lists_flags");

    let home = TempDir::new().unwrap();
    let output = aphd(home.path()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--config", "--namespace", "--mount", "--no-console", "--verbose"] {
        assert!(stdout.contains(flag), "missing {flag} in help: {stdout}");
    }

    crate::test_log!("TEST PASS: test_help_lists_flags");
}

#[test]
fn test_version() {
    let home = TempDir::new().unwrap();
    let output = aphd(home.path()).arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_explicit_config_fails() {
    crate::test_log!("TEST START: test_missing_explicit_config_fails");

    let home = TempDir::new().unwrap();
    let output = aphd(home.path())
        .arg("--config")
        .arg(home.path().join("missing.toml"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("configuration"), "stderr: {stderr}");

    crate::test_log!("TEST PASS: test_missing_explicit_config_fails");
}

#[test]
fn test_exits_when_acme_is_unreachable() {
    let home = TempDir::new().unwrap();
    let mount = home.path().join("acme");
    std::fs::create_dir(&mount).unwrap();

    let output = aphd(home.path()).arg("--mount").arg(&mount).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("setting up logging"), "stderr: {stderr}");
    assert!(stderr.contains("acme console unavailable"), "stderr: {stderr}");
}

#[test]
fn test_no_console_fails_on_event_log() {
    let home = TempDir::new().unwrap();
    let mount = home.path().join("acme");
    std::fs::create_dir(&mount).unwrap();

    let output = aphd(home.path())
        .arg("--mount")
        .arg(&mount)
        .arg("--no-console")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("setting up logging"), "stderr: {stderr}");
    assert!(stderr.contains("cannot connect to acme"), "stderr: {stderr}");
}

#[test]
fn test_namespace_and_mount_conflict() {
    let home = TempDir::new().unwrap();
    let output = aphd(home.path())
        .args(["--namespace", "/tmp/ns", "--mount", "/mnt/acme"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

//! Subcommands that run without acme.

use crate::common::{aph, assert_contains, init_test_logging};
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

#[test]
fn test_help_lists_subcommands() {
    init_test_logging();
    crate::test_log!("TEST START: test_help_lists_subcommands");

    let home = TempDir::new().unwrap();
    let output = aph(home.path()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for sub in ["do", "format", "root", "config"] {
        assert_contains(&stdout, sub);
    }

    crate::test_log!("TEST PASS: test_help_lists_subcommands");
}

#[test]
fn test_root_uses_configured_resolver() {
    init_test_logging();
    let home = TempDir::new().unwrap();
    let base = std::fs::canonicalize(home.path()).unwrap();
    let project = base.join("project");
    std::fs::create_dir_all(project.join("src")).unwrap();
    let resolver = base.join("resolve");
    std::fs::write(&resolver, format!("#!/bin/sh\necho '{}'\n", project.display())).unwrap();
    std::fs::set_permissions(&resolver, std::fs::Permissions::from_mode(0o755)).unwrap();

    let output = aph(home.path())
        .env("APH_RESOLVER", &resolver)
        .arg("root")
        .arg(project.join("src/main.x"))
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim_end(),
        project.display().to_string()
    );
}

#[test]
fn test_root_falls_back_to_directory() {
    init_test_logging();
    let home = TempDir::new().unwrap();
    let base = std::fs::canonicalize(home.path()).unwrap();

    let output = aph(home.path())
        .env("APH_RESOLVER", "false")
        .arg("root")
        .arg(&base)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim_end(),
        base.display().to_string()
    );
}

#[test]
fn test_do_outside_acme_reports_catalog_error() {
    init_test_logging();
    crate::test_log!("TEST START: test_do_outside_acme_reports_catalog_error");

    let home = TempDir::new().unwrap();
    let output = aph(home.path()).arg("do").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "winid is not set");
    assert_contains(&stderr, "[APH-E301]");

    crate::test_log!("TEST PASS: test_do_outside_acme_reports_catalog_error");
}

#[test]
fn test_format_requires_command() {
    init_test_logging();
    let home = TempDir::new().unwrap();
    let output = aph(home.path()).arg("format").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_format_with_unreachable_acme() {
    init_test_logging();
    let home = TempDir::new().unwrap();
    let mount = home.path().join("acme");
    std::fs::create_dir(&mount).unwrap();

    let output = aph(home.path())
        .env("winid", "1")
        .env("%", "/tmp/a.x")
        .arg("--mount")
        .arg(&mount)
        .args(["format", "--", "cat"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "cannot connect to acme");
    assert_contains(&stderr, "[APH-E100]");
}

fn do_with_unreachable_acme(home: &TempDir, extra: &[&str]) -> String {
    let mount = home.path().join("acme");
    std::fs::create_dir_all(&mount).unwrap();
    let output = aph(home.path())
        .env("winid", "1")
        .env("%", "/tmp/a.x")
        .arg("--mount")
        .arg(&mount)
        .args(extra)
        .arg("do")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_do_logs_to_acme_console() {
    init_test_logging();
    let home = TempDir::new().unwrap();
    let stderr = do_with_unreachable_acme(&home, &[]);
    assert_contains(&stderr, "setting up logging: acme console unavailable");
    assert_contains(&stderr, "[APH-E100]");
}

#[test]
fn test_do_without_console() {
    init_test_logging();
    let home = TempDir::new().unwrap();
    let stderr = do_with_unreachable_acme(&home, &["--no-console"]);
    assert!(!stderr.contains("setting up logging"), "stderr: {stderr}");
    assert_contains(&stderr, "cannot connect to acme");
    assert_contains(&stderr, "[APH-E100]");
}

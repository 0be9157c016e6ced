//! Manifest rendering through the binary, driven by PLATFORM and VERSION.

use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn manifest_command(template_dir: &TempDir) -> Command {
    let template = template_dir.path().join("manifest.tmpl");
    fs::write(&template, "v${VERSION}-${PLATFORM}").unwrap();

    let mut command = Command::new(env!("CARGO_BIN_EXE_prebuild-patcher"));
    command
        .env_remove("PLATFORM")
        .env_remove("VERSION")
        .arg("manifest")
        .arg("--template")
        .arg(&template);
    command
}

#[test]
fn test_renders_both_values() {
    let dir = TempDir::new().unwrap();
    let output = manifest_command(&dir)
        .env("PLATFORM", "esp32")
        .env("VERSION", "1.2.3")
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "v1.2.3-esp32\n");
}

#[test]
fn test_missing_version_fails_without_output() {
    let dir = TempDir::new().unwrap();
    let output = manifest_command(&dir)
        .env("PLATFORM", "esp32")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("VERSION"));
}

#[test]
fn test_missing_platform_fails_without_output() {
    let dir = TempDir::new().unwrap();
    let output = manifest_command(&dir)
        .env("VERSION", "1.2.3")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

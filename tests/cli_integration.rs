//! Integration tests for the command-line interface.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const UPSTREAM: &str = "int gap_init(void) {\n    return 0;\n}\n";
const FIXED: &str = "int gap_init(void) {\n    reset_state();\n    return 0;\n}\n";

fn bin() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_prebuild-patcher"));
    command
        .env_remove("PREBUILD_PATCHER_PROJECT")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .env("CLICOLOR", "0");
    command
}

const IN_PROCESS: &str = "[tool]\nkind = \"in-process\"\n";

/// Helper to create a project with one library, one patch and a graph snapshot
fn setup_project(include_library: bool) -> TempDir {
    setup_project_with_tool(include_library, IN_PROCESS)
}

/// Same project, with `tool` as the config's `[tool]` table (empty for defaults)
fn setup_project_with_tool(include_library: bool, tool: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    fs::create_dir_all(root.join("libdeps/NimBLE/src")).unwrap();
    fs::write(root.join("libdeps/NimBLE/src/ble_gap.c"), UPSTREAM).unwrap();

    fs::create_dir_all(root.join("patches")).unwrap();
    fs::write(
        root.join("patches/ble_gap.patch"),
        diffy::create_patch(UPSTREAM, FIXED).to_string(),
    )
    .unwrap();
    fs::write(
        root.join("patches/nimble.toml"),
        format!(
            r#"[meta]
name = "nimble-fixes"

{tool}
[[patches]]
id = "ble-gap"
patch = "patches/ble_gap.patch"
component = "NimBLE"
source = "ble_gap.c"
artifact = "host/ble_gap.c.o"
"#
        ),
    )
    .unwrap();

    let library = if include_library {
        r#"
[[builders]]
name = "NimBLE"
build_dir = "build/env/lib1a2"
source_dir = "libdeps/NimBLE/src"
"#
    } else {
        ""
    };
    fs::write(
        root.join("build-graph.toml"),
        format!(
            r#"[[builders]]
name = "FrameworkArduino"
build_dir = "build/env/framework"
{library}"#
        ),
    )
    .unwrap();

    dir
}

fn run(project: &Path, args: &[&str]) -> Output {
    bin()
        .args(args)
        .arg("--project")
        .arg(project)
        .output()
        .unwrap()
}

fn patch_tool_available() -> bool {
    let available = Command::new("patch").arg("--version").output().is_ok();
    if !available {
        eprintln!("note: `patch` not installed, skipping external tool test");
    }
    available
}

fn source(project: &Path) -> String {
    fs::read_to_string(project.join("libdeps/NimBLE/src/ble_gap.c")).unwrap()
}

#[test]
fn test_help() {
    let output = bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("prebuild"));
    assert!(stdout.contains("manifest"));
}

#[test]
fn test_plan_lists_artifact_without_patching() {
    let project = setup_project(true);
    let output = run(project.path(), &["plan"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("build/env/lib1a2/host/ble_gap.c.o"));
    assert!(stdout.contains("ble-gap"));
    assert_eq!(source(project.path()), UPSTREAM);
}

#[test]
fn test_prebuild_applies_only_for_matching_artifact() {
    let project = setup_project(true);

    let other = run(
        project.path(),
        &["prebuild", "--artifact", "build/env/framework/main.cpp.o"],
    );
    assert!(other.status.success());
    assert_eq!(source(project.path()), UPSTREAM);

    let artifact = project.path().join("build/env/lib1a2/host/ble_gap.c.o");
    let output = run(
        project.path(),
        &["prebuild", "--artifact", artifact.to_str().unwrap()],
    );
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Applied"));
    assert_eq!(source(project.path()), FIXED);

    // Incremental rebuild: hook runs again and is a no-op.
    let again = run(
        project.path(),
        &["prebuild", "--artifact", artifact.to_str().unwrap()],
    );
    assert!(again.status.success());
    assert!(String::from_utf8_lossy(&again.stdout).contains("Already applied"));
    assert_eq!(source(project.path()), FIXED);
}

#[test]
fn test_prebuild_failure_exits_nonzero() {
    let project = setup_project(true);
    let drifted = "int gap_init(int flags) {\n    return 0;\n}\n";
    fs::write(project.path().join("libdeps/NimBLE/src/ble_gap.c"), drifted).unwrap();

    let output = run(
        project.path(),
        &["prebuild", "--artifact", "build/env/lib1a2/host/ble_gap.c.o"],
    );
    assert!(!output.status.success());
    assert_eq!(source(project.path()), drifted);
}

#[test]
fn test_apply_without_library_is_clean_skip() {
    let project = setup_project(false);
    let output = run(project.path(), &["apply"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Skipped"));
    assert!(stdout.contains("0 applied"));
    assert_eq!(source(project.path()), UPSTREAM);
}

#[test]
fn test_apply_dry_run_then_status() {
    let project = setup_project(true);

    let dry = run(project.path(), &["apply", "--dry-run"]);
    assert!(dry.status.success());
    assert!(String::from_utf8_lossy(&dry.stdout).contains("Would apply"));
    assert_eq!(source(project.path()), UPSTREAM);

    let status = run(project.path(), &["status"]);
    assert!(String::from_utf8_lossy(&status.stdout).contains("NOT APPLIED"));

    let apply = run(project.path(), &["apply"]);
    assert!(apply.status.success());
    assert_eq!(source(project.path()), FIXED);

    let status = run(project.path(), &["status"]);
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("APPLIED"));
    assert!(!stdout.contains("NOT APPLIED"));
}

#[test]
fn test_missing_graph_is_error() {
    let project = setup_project(true);
    fs::remove_file(project.path().join("build-graph.toml")).unwrap();

    let output = run(project.path(), &["plan"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("build graph"));
}

#[test]
fn test_relative_graph_path_matches_relative_artifact() {
    let project = setup_project(true);

    let plan = bin()
        .current_dir(project.path())
        .args(["plan", "--project", ".", "--graph", "build-graph.toml"])
        .output()
        .unwrap();
    assert!(plan.status.success());
    let stdout = String::from_utf8_lossy(&plan.stdout);
    assert!(stdout
        .lines()
        .any(|line| line.trim() == "build/env/lib1a2/host/ble_gap.c.o"));

    let output = bin()
        .current_dir(project.path())
        .args([
            "prebuild",
            "--graph",
            "build-graph.toml",
            "--artifact",
            "build/env/lib1a2/host/ble_gap.c.o",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Applied"));
    assert_eq!(source(project.path()), FIXED);
}

#[test]
fn test_default_patch_tool_apply_and_rerun() {
    if !patch_tool_available() {
        return;
    }
    let project = setup_project_with_tool(true, "");

    let apply = run(project.path(), &["apply"]);
    assert!(apply.status.success());
    assert!(String::from_utf8_lossy(&apply.stdout).contains("1 applied"));
    assert_eq!(source(project.path()), FIXED);

    let rerun = run(
        project.path(),
        &["prebuild", "--artifact", "build/env/lib1a2/host/ble_gap.c.o"],
    );
    assert!(rerun.status.success());
    assert!(String::from_utf8_lossy(&rerun.stdout).contains("Already applied"));
    assert_eq!(source(project.path()), FIXED);
}

#[test]
fn test_default_patch_tool_rejects_drifted_context() {
    if !patch_tool_available() {
        return;
    }
    let project = setup_project_with_tool(true, "");
    // Only the closing context line differs from what the patch expects.
    let drifted = "int gap_init(void) {\n    return 0;\n} /* upstream */\n";
    fs::write(project.path().join("libdeps/NimBLE/src/ble_gap.c"), drifted).unwrap();

    let prebuild = run(
        project.path(),
        &["prebuild", "--artifact", "build/env/lib1a2/host/ble_gap.c.o"],
    );
    assert!(!prebuild.status.success());
    assert_eq!(source(project.path()), drifted);

    let apply = run(project.path(), &["apply"]);
    assert!(!apply.status.success());
    assert!(String::from_utf8_lossy(&apply.stdout).contains("1 failed"));
    assert_eq!(source(project.path()), drifted);
}

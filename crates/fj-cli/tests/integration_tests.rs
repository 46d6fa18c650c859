//! Integration tests for the fj-cc binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn fj_cc() -> Command {
    let mut cmd = Command::cargo_bin("fj-cc").unwrap();
    cmd.env_remove("FJ_VERBOSE").env_remove("FJ_DUMP_ASM");
    cmd
}

#[test]
fn test_cli_help() {
    fj_cc()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--dump-asm"))
        .stdout(predicate::str::contains("--filter"));
}

#[test]
fn test_cli_version() {
    fj_cc()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_list_prints_names_only() {
    fj_cc()
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains("AllocBase\n"))
        .stdout(predicate::str::contains("FuncCallRecursive\n"))
        .stdout(predicate::str::contains("[Test]").not());
}

#[test]
fn test_filtered_run_passes() {
    fj_cc()
        .args(["--filter", "AllocIfElse"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("FerroJit Compiler Test-Suite"))
        .stdout(predicate::str::contains("[ ] Verbose"))
        .stdout(predicate::str::contains("[Test] AllocIfElse1 [OK]"))
        .stdout(predicate::str::contains("[PASSED] 0 of 4 failed"))
        .stdout(predicate::str::contains("OutputSize="));
}

#[test]
fn test_unmatched_filter_runs_nothing() {
    fj_cc()
        .args(["--filter", "NoSuchTest"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("0 of 0 failed"));
}

#[test]
fn test_env_enables_dump() {
    fj_cc()
        .env("FJ_DUMP_ASM", "1")
        .args(["--filter", "MiscConstPool1"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("[x] DumpAsm"))
        .stdout(predicate::str::contains("; misc_const_pool1 ("));
}

#[test]
fn test_config_file_is_applied() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("fj.toml");
    fs::write(&config, "[harness]\nfilter = \"JumpCross\"\nopt_level = \"speed\"\n").unwrap();

    fj_cc()
        .arg("--config")
        .arg(&config)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("[Test] JumpCross [OK]"))
        .stdout(predicate::str::contains("0 of 1 failed"));
}

#[test]
fn test_config_in_working_directory() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("fj.toml"), "[harness]\nfilter = \"NoCode\"\n").unwrap();

    fj_cc()
        .current_dir(temp_dir.path())
        .assert()
        .code(0)
        .stdout(predicate::str::contains("[Test] NoCode [OK]"));
}

#[test]
fn test_bad_config_exits_with_usage_code() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("fj.toml");
    fs::write(&config, "[harness]\nverbose = \"loud\"\n").unwrap();

    fj_cc()
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn test_bad_opt_level_is_rejected() {
    fj_cc()
        .args(["--opt-level", "fastest"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("fastest"));
}

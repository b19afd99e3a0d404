//! End-to-end tests for CLI exit codes.
//!
//! - Exit code 0: Success, including runs where single repositories failed
//! - Exit code 1: Fatal error (unreadable list, insufficient disk space,
//!   invalid settings)
//! - Exit code 2: Invalid command-line usage (handled by clap)

mod common;
use common::prelude::*;

/// Exit code 0 is returned for --help.
#[test]
fn test_exit_code_help() {
    let mut cmd = cargo_bin_cmd!("repo-vault");

    cmd.arg("--help")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("backup"));
}

/// Exit code 0 is returned for --version.
#[test]
fn test_exit_code_version() {
    let mut cmd = cargo_bin_cmd!("repo-vault");

    cmd.arg("--version").assert().code(0);
}

/// Exit code 2 is returned for an unknown subcommand.
#[test]
fn test_exit_code_unknown_subcommand() {
    let mut cmd = cargo_bin_cmd!("repo-vault");

    cmd.arg("restore").assert().code(2);
}

/// Exit code 2 is returned for a malformed numeric flag.
#[test]
fn test_exit_code_malformed_number() {
    let fixture = TestFixture::new();

    fixture
        .command("backup")
        .arg("--jobs")
        .arg("many")
        .assert()
        .code(2);
}

/// Exit code 1 is returned for an unknown log level.
#[test]
fn test_exit_code_bad_log_level() {
    let fixture = TestFixture::new().with_repo_list("");

    fixture
        .command("check")
        .arg("--log-level")
        .arg("chatty")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid log level"));
}

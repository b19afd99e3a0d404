//! End-to-end tests for the `space` command.

mod common;
use common::prelude::*;

#[test]
fn test_space_passes_with_zero_minimum() {
    let fixture = TestFixture::new();

    fixture
        .command("space")
        .arg("--min-free-gb")
        .arg("0")
        .assert()
        .success()
        .stdout(predicate::str::contains("Free space:"))
        .stdout(predicate::str::contains("Backup size: 0.00 GB"));
}

#[test]
fn test_space_fails_below_minimum() {
    let fixture = TestFixture::new();

    fixture
        .command("space")
        .arg("--min-free-gb")
        .arg("1000000000")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Insufficient disk space"));
}

#[test]
fn test_space_warns_on_large_backup_tree() {
    let fixture = TestFixture::new();
    fixture
        .temp
        .child("backups/alice_repo1/main/zips/main_20240101_000000.zip")
        .write_binary(&[0u8; 4096])
        .unwrap();

    fixture
        .command("space")
        .arg("--min-free-gb")
        .arg("0")
        .arg("--size-warning-gb")
        .arg("0")
        .assert()
        .success()
        .stdout(predicate::str::contains("[WARN]"))
        .stdout(predicate::str::contains("exceeds"));
}

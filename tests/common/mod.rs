//! Shared test utilities for the CLI end-to-end tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_repo_list("alice/repo1\n");
//!     fixture.command("check").assert().success();
//! }
//! ```

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use assert_fs::prelude::*;
use std::path::Path;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    pub use predicates::prelude::*;

    pub use super::TestFixture;
}

/// Environment variables that would leak host settings into a test run.
const ISOLATED_ENV: &[&str] = &[
    "GITHUB_TOKEN",
    "RUST_LOG",
    "REPO_VAULT_CONFIG",
    "REPO_VAULT_REPO_LIST",
    "REPO_VAULT_CLONE_ROOT",
    "REPO_VAULT_BACKUP_ROOT",
    "REPO_VAULT_BRANCH_THRESHOLD_HOURS",
    "REPO_VAULT_SIZE_WARNING_GB",
    "REPO_VAULT_MIN_FREE_GB",
    "REPO_VAULT_ZIP_FOLDER",
    "REPO_VAULT_JOBS",
    "REPO_VAULT_DEFAULT_HOST",
];

/// A temporary directory holding a repository list plus clone and backup
/// roots.
pub struct TestFixture {
    pub temp: assert_fs::TempDir,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            temp: assert_fs::TempDir::new().unwrap(),
        }
    }

    /// Write `content` to `repos.txt`.
    pub fn with_repo_list(self, content: &str) -> Self {
        self.temp.child("repos.txt").write_str(content).unwrap();
        self
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// `repo-vault <subcommand>` pointed at the fixture's list and roots,
    /// with colors off and host settings cleared.
    pub fn command(&self, subcommand: &str) -> Command {
        let mut cmd = cargo_bin_cmd!("repo-vault");
        for var in ISOLATED_ENV {
            cmd.env_remove(var);
        }
        cmd.env("NO_COLOR", "1")
            .current_dir(self.path())
            .arg("--color")
            .arg("never")
            .arg(subcommand)
            .arg("--repo-list")
            .arg(self.path().join("repos.txt"))
            .arg("--clone-root")
            .arg(self.path().join("clones"))
            .arg("--backup-root")
            .arg(self.path().join("backups"));
        cmd
    }
}

//! Default values for repo-vault configuration.
//!
//! This module provides centralized default values used across commands,
//! ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Default repository list file, relative to the working directory.
pub const REPO_LIST: &str = "repos.txt";

/// Branches with a commit newer than this many hours are archived.
pub const BRANCH_THRESHOLD_HOURS: f64 = 24.5;

/// Backup tree size, in GB, above which a warning is logged.
pub const SIZE_WARNING_GB: f64 = 10.0;

/// Free space, in GB, below which a run aborts.
pub const MIN_FREE_GB: f64 = 20.0;

/// Sub-folder holding archives under each branch directory.
pub const ZIP_FOLDER: &str = "zips";

/// Repositories processed concurrently.
pub const JOBS: usize = 1;

/// Returns the root directory under which repo-vault keeps its state.
///
/// Uses the platform-appropriate data directory:
/// - Linux: `~/.local/share/repo-vault` (XDG Base Directory)
/// - macOS: `~/Library/Application Support/repo-vault`
/// - Windows: `{FOLDERID_RoamingAppData}\repo-vault`
///
/// Falls back to `.repo-vault` in the current directory if the platform
/// data directory cannot be determined.
pub fn data_root() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("repo-vault"))
        .unwrap_or_else(|| PathBuf::from(".repo-vault"))
}

/// Default directory holding the mirrored working copies.
pub fn clone_root() -> PathBuf {
    data_root().join("clones")
}

/// Default directory receiving archives.
pub fn backup_root() -> PathBuf {
    data_root().join("backups")
}

//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `repo-vault` command-line tool. Each subcommand is defined in its own file.
//!
//! ## Structure
//!
//! Each command module contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and performs the
//!   command's logic by calling into the `repo_vault` library.
//!
//! Settings shared by every command live in `ConfigArgs`, which resolves the
//! command line, the environment and an optional TOML file into one
//! `BackupConfig`.

pub mod backup;
pub mod check;
pub mod space;

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use repo_vault::config::{BackupConfig, FileConfig, Overrides};

/// Settings accepted by every command.
///
/// Anything left unset falls back to the config file, then to the defaults.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// TOML file with default settings
    #[arg(long = "config", value_name = "FILE", env = "REPO_VAULT_CONFIG")]
    pub config_file: Option<PathBuf>,

    /// File listing one repository reference per line [default: repos.txt]
    #[arg(long, value_name = "FILE", env = "REPO_VAULT_REPO_LIST")]
    pub repo_list: Option<PathBuf>,

    /// Directory holding the local working copies
    #[arg(long, value_name = "DIR", env = "REPO_VAULT_CLONE_ROOT")]
    pub clone_root: Option<PathBuf>,

    /// Directory receiving the archives
    #[arg(long, value_name = "DIR", env = "REPO_VAULT_BACKUP_ROOT")]
    pub backup_root: Option<PathBuf>,

    /// Archive branches with commits newer than this many hours [default: 24.5]
    #[arg(long, value_name = "HOURS", env = "REPO_VAULT_BRANCH_THRESHOLD_HOURS")]
    pub branch_threshold_hours: Option<f64>,

    /// Warn when the backup tree grows beyond this size [default: 10]
    #[arg(long, value_name = "GB", env = "REPO_VAULT_SIZE_WARNING_GB")]
    pub size_warning_gb: Option<f64>,

    /// Abort when free space at the backup root drops below this [default: 20]
    #[arg(long, value_name = "GB", env = "REPO_VAULT_MIN_FREE_GB")]
    pub min_free_gb: Option<f64>,

    /// Access token injected into HTTPS clone URLs
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Name of the archive folder under each branch directory [default: zips]
    #[arg(long, value_name = "NAME", env = "REPO_VAULT_ZIP_FOLDER")]
    pub zip_folder: Option<String>,

    /// Repositories processed in parallel [default: 1]
    #[arg(long, value_name = "N", env = "REPO_VAULT_JOBS")]
    pub jobs: Option<usize>,

    /// Host used for `owner/repo` shorthand [default: github.com]
    #[arg(long, value_name = "HOST", env = "REPO_VAULT_DEFAULT_HOST")]
    pub default_host: Option<String>,
}

impl ConfigArgs {
    /// Layer these arguments over the config file and the defaults.
    pub fn resolve(self) -> Result<BackupConfig> {
        let file = self
            .config_file
            .as_deref()
            .map(FileConfig::from_file)
            .transpose()?;
        let overrides = Overrides {
            repo_list: self.repo_list,
            clone_root: self.clone_root,
            backup_root: self.backup_root,
            branch_threshold_hours: self.branch_threshold_hours,
            size_warning_gb: self.size_warning_gb,
            min_free_gb: self.min_free_gb,
            token: self.token,
            zip_folder: self.zip_folder,
            jobs: self.jobs,
            default_host: self.default_host,
        };
        Ok(BackupConfig::resolve(file, overrides)?)
    }
}

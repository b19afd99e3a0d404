//! # Configuration
//!
//! Resolves the settings of a backup run from three layers, highest
//! precedence first:
//!
//! 1. **Overrides**: values given on the command line or through environment
//!    variables (collected by the CLI into an `Overrides`).
//! 2. **Config file**: an optional TOML file parsed into a `FileConfig`.
//! 3. **Defaults**: the constants and platform paths in `crate::defaults`.
//!
//! ## Example file
//!
//! ```toml
//! repo_list = "/etc/repo-vault/repos.txt"
//! backup_root = "/mnt/backup/repos"
//! branch_threshold_hours = 48
//! min_free_gb = 50
//! jobs = 4
//! ```
//!
//! The resolved `BackupConfig` is validated before use; bad values surface as
//! `Error::ConfigParse` with a hint.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::descriptor::DEFAULT_HOST;
use crate::error::{Error, Result};
use crate::path::is_safe_component;

/// Fully resolved settings for a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupConfig {
    pub repo_list: PathBuf,
    pub clone_root: PathBuf,
    pub backup_root: PathBuf,
    pub branch_threshold_hours: f64,
    pub size_warning_gb: f64,
    pub min_free_gb: f64,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub zip_folder: String,
    pub jobs: usize,
    pub default_host: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            repo_list: PathBuf::from(defaults::REPO_LIST),
            clone_root: defaults::clone_root(),
            backup_root: defaults::backup_root(),
            branch_threshold_hours: defaults::BRANCH_THRESHOLD_HOURS,
            size_warning_gb: defaults::SIZE_WARNING_GB,
            min_free_gb: defaults::MIN_FREE_GB,
            token: None,
            zip_folder: defaults::ZIP_FOLDER.to_string(),
            jobs: defaults::JOBS,
            default_host: DEFAULT_HOST.to_string(),
        }
    }
}

/// Settings as written in a TOML config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub repo_list: Option<PathBuf>,
    pub clone_root: Option<PathBuf>,
    pub backup_root: Option<PathBuf>,
    pub branch_threshold_hours: Option<f64>,
    pub size_warning_gb: Option<f64>,
    pub min_free_gb: Option<f64>,
    pub token: Option<String>,
    pub zip_folder: Option<String>,
    pub jobs: Option<usize>,
    pub default_host: Option<String>,
}

/// Settings given on the command line or via environment variables.
pub type Overrides = FileConfig;

impl FileConfig {
    /// Parse TOML config text.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::ConfigParse {
            message: format!("cannot read {}: {}", path.display(), e),
            hint: None,
        })?;
        Self::parse(&content)
    }

    /// Overlay the values set in `self` onto `config`.
    fn apply_to(self, config: &mut BackupConfig) {
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    config.$field = value;
                })*
            };
        }
        overlay!(
            repo_list,
            clone_root,
            backup_root,
            branch_threshold_hours,
            size_warning_gb,
            min_free_gb,
            zip_folder,
            jobs,
            default_host,
        );
        if self.token.is_some() {
            config.token = self.token;
        }
    }
}

impl BackupConfig {
    /// Layer `file` and then `overrides` over the defaults and validate.
    pub fn resolve(file: Option<FileConfig>, overrides: Overrides) -> Result<Self> {
        let mut config = BackupConfig::default();
        if let Some(file) = file {
            file.apply_to(&mut config);
        }
        overrides.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Reject values a run cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.branch_threshold_hours.is_finite() && self.branch_threshold_hours > 0.0) {
            return Err(invalid(
                format!(
                    "branch_threshold_hours must be positive, got {}",
                    self.branch_threshold_hours
                ),
                Some("The default is 24.5 hours"),
            ));
        }
        for (key, value) in [
            ("size_warning_gb", self.size_warning_gb),
            ("min_free_gb", self.min_free_gb),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(
                    format!("{} must be zero or positive, got {}", key, value),
                    None,
                ));
            }
        }
        if self.jobs == 0 {
            return Err(invalid(
                "jobs must be at least 1".to_string(),
                Some("Set jobs = 1 for sequential runs"),
            ));
        }
        if !is_safe_component(&self.zip_folder) {
            return Err(invalid(
                format!("zip_folder '{}' must be a single folder name", self.zip_folder),
                Some("Use letters, digits, '.', '-' or '_' only"),
            ));
        }
        if self.default_host.trim().is_empty() {
            return Err(invalid("default_host must not be empty".to_string(), None));
        }
        Ok(())
    }
}

fn invalid(message: String, hint: Option<&str>) -> Error {
    Error::ConfigParse {
        message,
        hint: hint.map(str::to_string),
    }
}

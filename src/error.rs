//! # Error Handling
//!
//! This module defines the centralized error type for `repo-vault`. It uses
//! the `thiserror` library to build a single `Error` enum covering every
//! failure mode of a backup run, along with a `Result<T>` alias used across
//! the library.
//!
//! ## Fatal vs. recoverable
//!
//! Most variants describe a failure of one independent unit of work (one
//! repository line, one repository, one branch, one archive). The
//! orchestrator logs those and moves on. Only two variants abort a run:
//!
//! - `SpaceExhausted`: free space fell below the configured minimum.
//! - `ListSourceMissing`: the repository list could not be read.
//!
//! `Error::is_fatal` encodes that split so callers never have to match on
//! variants to decide whether to continue.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for repo-vault operations
#[derive(Error, Debug)]
pub enum Error {
    /// A repository reference matched none of the accepted shapes.
    #[error("Invalid repository reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    /// Cloning or fetching a repository failed.
    #[error("Sync failed for {repo}: {message}")]
    SyncFailed { repo: String, message: String },

    /// Switching the working copy to a branch failed.
    #[error("Checkout of '{branch}' failed in {repo}: {message}")]
    CheckoutFailed {
        repo: String,
        branch: String,
        message: String,
    },

    /// Producing an archive failed.
    #[error("Archive creation failed for {}: {message}", path.display())]
    ArchiveFailed { path: PathBuf, message: String },

    /// Free space dropped below the error threshold.
    #[error(
        "Insufficient disk space at {}: {available_bytes} bytes free, {required_bytes} bytes required",
        path.display()
    )]
    SpaceExhausted {
        path: PathBuf,
        available_bytes: u64,
        required_bytes: u64,
    },

    /// The repository list could not be read.
    #[error("Repository list unreadable at {}: {message}", path.display())]
    ListSourceMissing { path: PathBuf, message: String },

    /// A git command exited unsuccessfully or could not be spawned.
    #[error("Git command failed in {}: git {command} - {stderr}", dir.display())]
    GitCommand {
        command: String,
        dir: PathBuf,
        stderr: String,
    },

    /// The configuration file or a configuration value was rejected.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A TOML parsing error, wrapped from `toml::de::Error`.
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error must terminate the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::SpaceExhausted { .. } | Error::ListSourceMissing { .. }
        )
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

//! # Archive Generation
//!
//! Produces the files that make up a backup:
//!
//! - a **full archive** of the default branch's working tree, without the
//!   `.git` directory, and
//! - a **partial archive** per recently active branch, holding only the files
//!   that differ from the default branch and still exist on that branch.
//!
//! Archives are written to
//! `{backup_root}/{repo}/{label}/{zip_folder}/{label}_{timestamp}.{ext}` and
//! are never overwritten: a name collision gets a numeric suffix.
//!
//! Compression itself is delegated to an `Archiver`; `ZipArchiver` drives
//! the system `zip` tool.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use log::info;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::path::safe_branch_label;
use crate::repository::{RepositoryState, VcsOperations};

/// Timestamp format used in archive file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Whether an archive holds the whole tree or only a branch's changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArchiveKind {
    Full,
    Partial,
}

/// An archive written during this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Archive {
    pub repo_name: String,
    pub branch_label: String,
    pub kind: ArchiveKind,
    pub path: PathBuf,
    pub timestamp: String,
    /// Number of files placed in a partial archive; `None` for full ones.
    pub file_count: Option<usize>,
}

/// Compression backend.
pub trait Archiver: Send + Sync {
    /// File extension of produced archives, without the dot.
    fn extension(&self) -> &str;

    /// Archive everything under `source_dir` except `.git`.
    fn archive_tree(&self, source_dir: &Path, dest: &Path) -> Result<()>;

    /// Archive exactly `files` (relative to `source_dir`), keeping their
    /// relative paths.
    fn archive_files(&self, source_dir: &Path, files: &[String], dest: &Path) -> Result<()>;
}

/// `Archiver` backed by the system `zip` command.
pub struct ZipArchiver;

impl ZipArchiver {
    fn finish(output: std::process::Output, dest: &Path) -> Result<()> {
        if output.status.success() {
            return Ok(());
        }
        Err(Error::ArchiveFailed {
            path: dest.to_path_buf(),
            message: format!(
                "zip exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        })
    }

    fn spawn_failed(dest: &Path, e: std::io::Error) -> Error {
        Error::ArchiveFailed {
            path: dest.to_path_buf(),
            message: format!("could not run zip: {}", e),
        }
    }
}

impl Archiver for ZipArchiver {
    fn extension(&self) -> &str {
        "zip"
    }

    fn archive_tree(&self, source_dir: &Path, dest: &Path) -> Result<()> {
        let dest = std::path::absolute(dest)?;
        let output = Command::new("zip")
            .current_dir(source_dir)
            .args(["-q", "-r", "-y"])
            .arg(&dest)
            .args([".", "-x", ".git", ".git/*"])
            .output()
            .map_err(|e| Self::spawn_failed(&dest, e))?;
        Self::finish(output, &dest)
    }

    fn archive_files(&self, source_dir: &Path, files: &[String], dest: &Path) -> Result<()> {
        let dest = std::path::absolute(dest)?;
        // `-@` reads names from stdin, avoiding argument length limits.
        let mut child = Command::new("zip")
            .current_dir(source_dir)
            .args(["-q", "-y"])
            .arg(&dest)
            .arg("-@")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Self::spawn_failed(&dest, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            for file in files {
                writeln!(stdin, "{}", file).map_err(|e| Error::ArchiveFailed {
                    path: dest.clone(),
                    message: format!("could not pass file list to zip: {}", e),
                })?;
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Self::spawn_failed(&dest, e))?;
        Self::finish(output, &dest)
    }
}

/// Builds full and partial archives for synchronized working copies.
pub struct ArchiveBuilder {
    vcs: Arc<dyn VcsOperations>,
    archiver: Arc<dyn Archiver>,
    backup_root: PathBuf,
    zip_folder: String,
}

impl ArchiveBuilder {
    pub fn new(
        vcs: Arc<dyn VcsOperations>,
        archiver: Arc<dyn Archiver>,
        backup_root: PathBuf,
        zip_folder: String,
    ) -> Self {
        Self {
            vcs,
            archiver,
            backup_root,
            zip_folder,
        }
    }

    /// Directory receiving archives for one repository and branch label.
    pub fn archive_dir(&self, repo_name: &str, label: &str) -> PathBuf {
        self.backup_root
            .join(repo_name)
            .join(label)
            .join(&self.zip_folder)
    }

    /// Archive the default branch's full working tree.
    pub fn build_full_archive(
        &self,
        state: &RepositoryState,
        repo_name: &str,
        timestamp: &str,
    ) -> Result<Archive> {
        let branch = &state.default_branch;
        self.vcs
            .checkout(&state.local_path, branch)
            .map_err(|e| Error::CheckoutFailed {
                repo: repo_name.to_string(),
                branch: branch.clone(),
                message: e.to_string(),
            })?;

        let label = safe_branch_label(branch);
        let path = self.next_archive_path(repo_name, &label, timestamp)?;
        self.archiver
            .archive_tree(&state.local_path, &path)
            .map_err(|e| archive_failed(&path, e))?;

        Ok(Archive {
            repo_name: repo_name.to_string(),
            branch_label: label,
            kind: ArchiveKind::Full,
            path,
            timestamp: timestamp.to_string(),
            file_count: None,
        })
    }

    /// Archive the files of `branch` that differ from the default branch.
    ///
    /// Force-checks-out the branch tip, overwriting the working copy. Files
    /// from `diff_files` that no longer exist on the branch are skipped; when
    /// none remain, nothing is written and `Ok(None)` is returned.
    pub fn build_partial_archive(
        &self,
        state: &RepositoryState,
        repo_name: &str,
        branch: &str,
        diff_files: &[String],
        timestamp: &str,
    ) -> Result<Option<Archive>> {
        self.vcs
            .checkout_remote_tip(&state.local_path, branch)
            .map_err(|e| Error::CheckoutFailed {
                repo: repo_name.to_string(),
                branch: branch.to_string(),
                message: e.to_string(),
            })?;

        let present = existing_files(&state.local_path, diff_files);
        if present.is_empty() {
            info!(
                "[{}] No changed files present on '{}', nothing to archive",
                repo_name, branch
            );
            return Ok(None);
        }

        let label = safe_branch_label(branch);
        let path = self.next_archive_path(repo_name, &label, timestamp)?;
        self.archiver
            .archive_files(&state.local_path, &present, &path)
            .map_err(|e| archive_failed(&path, e))?;

        Ok(Some(Archive {
            repo_name: repo_name.to_string(),
            branch_label: label,
            kind: ArchiveKind::Partial,
            path,
            timestamp: timestamp.to_string(),
            file_count: Some(present.len()),
        }))
    }

    /// First unused `{label}_{timestamp}[-N].{ext}` path, creating its
    /// directory.
    fn next_archive_path(&self, repo_name: &str, label: &str, timestamp: &str) -> Result<PathBuf> {
        let dir = self.archive_dir(repo_name, label);
        fs::create_dir_all(&dir).map_err(|e| Error::ArchiveFailed {
            path: dir.clone(),
            message: e.to_string(),
        })?;

        let ext = self.archiver.extension();
        let mut candidate = dir.join(format!("{}_{}.{}", label, timestamp, ext));
        let mut n = 1;
        while candidate.exists() {
            candidate = dir.join(format!("{}_{}-{}.{}", label, timestamp, n, ext));
            n += 1;
        }
        Ok(candidate)
    }
}

/// Entries of `files` that exist (as files or links) under `root`.
fn existing_files(root: &Path, files: &[String]) -> Vec<String> {
    files
        .iter()
        .filter(|f| {
            fs::symlink_metadata(root.join(f.as_str()))
                .map(|m| !m.is_dir())
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

fn archive_failed(path: &Path, e: Error) -> Error {
    match e {
        Error::ArchiveFailed { .. } => e,
        other => Error::ArchiveFailed {
            path: path.to_path_buf(),
            message: other.to_string(),
        },
    }
}

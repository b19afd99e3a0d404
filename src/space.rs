//! # Disk Space Guard
//!
//! Admission control for a backup run. Two checks are offered:
//!
//! - **free space**: compares the free bytes on the filesystem backing a
//!   path against a minimum. When free space cannot be determined the check
//!   passes with a warning (fail-open).
//! - **backup size**: sums the size of the backup tree and warns when it
//!   exceeds a threshold. This check never fails a run.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Bytes per gigabyte used for every threshold (binary, 1024^3).
pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Convert a GB threshold to bytes.
pub fn gb_to_bytes(gb: f64) -> u64 {
    (gb.max(0.0) * BYTES_PER_GB as f64) as u64
}

/// Format a byte count as GB with two decimals.
pub fn format_gb(bytes: u64) -> String {
    format!("{:.2} GB", bytes as f64 / BYTES_PER_GB as f64)
}

/// Source of free-space figures.
pub trait SpaceProbe: Send + Sync {
    /// Bytes available to unprivileged users on the filesystem of `path`.
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// `SpaceProbe` using the platform statvfs/GetDiskFreeSpaceEx via `fs2`.
pub struct Fs2SpaceProbe;

impl SpaceProbe for Fs2SpaceProbe {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }
}

/// Outcome of a free-space check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpaceCheck {
    Sufficient { available_bytes: u64 },
    Insufficient { available_bytes: u64, required_bytes: u64 },
    /// Free space could not be read; treated as sufficient.
    Unknown,
}

impl SpaceCheck {
    pub fn passed(&self) -> bool {
        !matches!(self, SpaceCheck::Insufficient { .. })
    }
}

/// Outcome of the backup-size check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeReport {
    pub total_bytes: u64,
    pub threshold_bytes: u64,
    pub exceeded: bool,
}

/// Free-space and backup-size checks.
pub struct SpaceGuard {
    probe: Arc<dyn SpaceProbe>,
}

impl SpaceGuard {
    pub fn new(probe: Arc<dyn SpaceProbe>) -> Self {
        Self { probe }
    }

    /// Measure free space at `path` against `min_gb`.
    ///
    /// Exactly `min_gb` free passes. A path that does not exist yet is
    /// measured at its nearest existing ancestor.
    pub fn free_space(&self, path: &Path, min_gb: f64) -> SpaceCheck {
        let required_bytes = gb_to_bytes(min_gb);
        let target = nearest_existing(path);

        match self.probe.available_bytes(&target) {
            Ok(available_bytes) if available_bytes < required_bytes => SpaceCheck::Insufficient {
                available_bytes,
                required_bytes,
            },
            Ok(available_bytes) => SpaceCheck::Sufficient { available_bytes },
            Err(e) => {
                warn!(
                    "Could not determine free space at {}: {}; continuing",
                    target.display(),
                    e
                );
                SpaceCheck::Unknown
            }
        }
    }

    /// `true` unless free space at `path` is known to be below `min_gb`.
    pub fn check_free_space(&self, path: &Path, min_gb: f64) -> bool {
        self.free_space(path, min_gb).passed()
    }

    /// Like `free_space`, but insufficient space is a `SpaceExhausted` error.
    pub fn ensure_free_space(&self, path: &Path, min_gb: f64) -> Result<SpaceCheck> {
        match self.free_space(path, min_gb) {
            SpaceCheck::Insufficient {
                available_bytes,
                required_bytes,
            } => Err(Error::SpaceExhausted {
                path: path.to_path_buf(),
                available_bytes,
                required_bytes,
            }),
            check => Ok(check),
        }
    }

    /// Total size of `backup_root`, warning when it exceeds `warn_gb`.
    ///
    /// A missing root counts as empty.
    pub fn check_backup_size(&self, backup_root: &Path, warn_gb: f64) -> SizeReport {
        let threshold_bytes = gb_to_bytes(warn_gb);
        let total_bytes = tree_size(backup_root);
        let exceeded = total_bytes > threshold_bytes;
        if exceeded {
            warn!(
                "Backup size {} at {} exceeds the {} warning threshold",
                format_gb(total_bytes),
                backup_root.display(),
                format_gb(threshold_bytes)
            );
        }
        SizeReport {
            total_bytes,
            threshold_bytes,
            exceeded,
        }
    }
}

/// Recursive size of regular files under `root`, without following links.
pub fn tree_size(root: &Path) -> u64 {
    if !root.exists() {
        return 0;
    }
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry while sizing: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn nearest_existing(path: &Path) -> PathBuf {
    let mut candidate = path;
    loop {
        if candidate.exists() {
            return candidate.to_path_buf();
        }
        match candidate.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => candidate = parent,
            _ => return path.to_path_buf(),
        }
    }
}

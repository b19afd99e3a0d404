//! # Space Command Implementation
//!
//! This module implements the `space` subcommand, which runs only the disk
//! space checks of a backup: free space at the backup root against the
//! minimum, and the size of the backup tree against the warning threshold.
//! It is a read-only operation; nothing is cloned or archived.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use repo_vault::space::{format_gb, gb_to_bytes, Fs2SpaceProbe, SpaceCheck, SpaceGuard};

use super::ConfigArgs;

/// Check free space at the backup root against the minimum
#[derive(Args, Debug)]
pub struct SpaceArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Execute the `space` command.
///
/// Fails when free space is known to be below the minimum. An oversized
/// backup tree only produces a warning.
pub fn execute(args: SpaceArgs) -> Result<()> {
    let config = args.config.resolve()?;
    let guard = SpaceGuard::new(Arc::new(Fs2SpaceProbe));
    let root = &config.backup_root;

    println!("Backup root: {}", root.display());
    let check = guard.ensure_free_space(root, config.min_free_gb)?;
    match check {
        SpaceCheck::Sufficient { available_bytes } => println!(
            "  Free space: {} (minimum {})",
            format_gb(available_bytes),
            format_gb(gb_to_bytes(config.min_free_gb))
        ),
        _ => println!("  Free space: unknown"),
    }

    let report = guard.check_backup_size(root, config.size_warning_gb);
    println!(
        "  Backup size: {} (warning above {})",
        format_gb(report.total_bytes),
        format_gb(report.threshold_bytes)
    );
    Ok(())
}

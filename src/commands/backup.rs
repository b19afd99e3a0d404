//! # Backup Command Implementation
//!
//! This module implements the `backup` subcommand, which performs a complete
//! backup run over the repository list:
//!
//! 1. Resolve settings and read the repository list. An unreadable list ends
//!    the command with a non-zero exit.
//! 2. Hand the valid descriptors to the `Orchestrator`, which syncs, archives
//!    and checks disk space.
//! 3. Optionally write the run summary as JSON.
//!
//! Failures of individual repositories are logged and counted but do not
//! change the exit status. Only a disk-space abort does.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use log::info;

use repo_vault::descriptor::DescriptorParser;
use repo_vault::orchestrator::{Orchestrator, RunOutcome, RunSummary};
use repo_vault::repo_list;

use super::ConfigArgs;

/// Sync every listed repository and write its archives
#[derive(Args, Debug)]
pub struct BackupArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Write the run summary as JSON to this file.
    #[arg(long, value_name = "FILE")]
    pub report_json: Option<PathBuf>,
}

/// Execute the `backup` command.
pub fn execute(args: BackupArgs) -> Result<()> {
    let config = args.config.resolve()?;
    let parser = DescriptorParser::with_host(config.token.clone(), &config.default_host);
    let list = repo_list::load(&config.repo_list, &parser)?;

    if list.descriptors.is_empty() {
        info!(
            "No repositories listed in {}, nothing to back up",
            config.repo_list.display()
        );
    }

    let RunOutcome { mut summary, fatal } = Orchestrator::new(&config).run(&list.descriptors);
    summary.invalid_references = list.invalid.len();
    summary.duplicate_references = list.duplicates;

    if let Some(path) = &args.report_json {
        write_report(path, &summary)?;
    }

    match fatal {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn write_report(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    info!("Run summary written to {}", path.display());
    Ok(())
}

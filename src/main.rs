//! # Repo Vault CLI
//!
//! This is the binary entry point for the `repo-vault` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Setting up logging and color output.
//! - Executing the appropriate command and translating top-level errors into
//!   a non-zero exit status.
//!
//! The backup logic lives in the `repo_vault` library crate; the binary is a
//! thin wrapper around it.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}

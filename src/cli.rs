//! CLI argument parsing, logging setup and command dispatch

use std::io::Write;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use repo_vault::output::{OutputConfig, Status};

use crate::commands;

/// Repo Vault - Mirror git repositories and archive recently active branches
#[derive(Parser, Debug)]
#[command(name = "repo-vault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    ///
    /// `RUST_LOG`, when set, takes precedence.
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync every listed repository and write its archives
    Backup(commands::backup::BackupArgs),

    /// Parse the repository list and report invalid lines
    Check(commands::check::CheckArgs),

    /// Check free space at the backup root against the minimum
    Space(commands::space::SpaceArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let output = OutputConfig::from_env_and_flag(&self.color);
        init_logging(&self.log_level, output.clone())?;

        match self.command {
            Commands::Backup(args) => commands::backup::execute(args),
            Commands::Check(args) => commands::check::execute(args, &output),
            Commands::Space(args) => commands::space::execute(args),
        }
    }
}

/// Install an `env_logger` writing `timestamp marker message` lines to
/// stdout.
fn init_logging(log_level: &str, output: OutputConfig) -> Result<()> {
    let level = LevelFilter::from_str(log_level)
        .map_err(|_| anyhow!("Invalid log level '{}'", log_level))?;

    let env = env_logger::Env::default().default_filter_or(level.as_str());
    let _ = env_logger::Builder::from_env(env)
        .target(env_logger::Target::Stdout)
        .format(move |buf, record| {
            writeln!(
                buf,
                "{} {} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                Status::of(record).marker(&output),
                record.args()
            )
        })
        .try_init();
    Ok(())
}

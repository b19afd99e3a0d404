//! # Check Command Implementation
//!
//! This module implements the `check` subcommand, which validates the
//! repository list without touching the network or the disk beyond reading
//! the list. Every accepted reference is printed with the local name it maps
//! to and its clone URL (credentials redacted); every rejected line is
//! printed with its line number.
//!
//! The command fails when the list is unreadable or any line is invalid, so
//! it can guard a list change in CI before the next scheduled backup.

use anyhow::{bail, Result};
use clap::Args;

use repo_vault::descriptor::DescriptorParser;
use repo_vault::output::{emoji, OutputConfig};
use repo_vault::repo_list::{self, RepoList};

use super::ConfigArgs;

/// Parse the repository list and report invalid lines
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Execute the `check` command, marking lines according to `output`.
pub fn execute(args: CheckArgs, output: &OutputConfig) -> Result<()> {
    let config = args.config.resolve()?;
    let parser = DescriptorParser::with_host(config.token.clone(), &config.default_host);
    println!("Checking repository list: {}", config.repo_list.display());

    let list = repo_list::load(&config.repo_list, &parser)?;
    print!("{}", render(&list, output));

    if !list.invalid.is_empty() {
        bail!(
            "{} invalid line(s) in {}",
            list.invalid.len(),
            config.repo_list.display()
        );
    }
    Ok(())
}

/// Text report of a parsed list.
fn render(list: &RepoList, output: &OutputConfig) -> String {
    let mut out = String::new();
    for descriptor in &list.descriptors {
        out.push_str(&format!(
            "  {} {} -> {}\n",
            descriptor.local_name,
            descriptor.source_ref,
            descriptor.display_url()
        ));
    }
    for line in &list.invalid {
        out.push_str(&format!(
            "{} line {}: {}\n",
            emoji(output, "❌", "[ERROR]"),
            line.line_number,
            line.error
        ));
    }

    let marker = if list.invalid.is_empty() {
        emoji(output, "✅", "[OK]")
    } else {
        emoji(output, "⚠️ ", "[WARN]")
    };
    out.push_str(&format!(
        "{} {} valid, {} invalid, {} duplicate(s) skipped\n",
        marker,
        list.descriptors.len(),
        list.invalid.len(),
        list.duplicates
    ));
    out
}

//! # Repo Vault Library
//!
//! This library mirrors a list of remote git repositories into local working
//! copies and turns them into timestamped zip archives. It is designed to be
//! used by the `repo-vault` command-line tool, but the pieces can be driven
//! directly from other programs.
//!
//! ## Quick Example
//!
//! ```
//! use repo_vault::descriptor::DescriptorParser;
//! use repo_vault::repo_list;
//!
//! let parser = DescriptorParser::new(None);
//! let list = repo_list::parse("# team repos\nalice/repo1\ngit@github.com:bob/repo2.git\n", &parser);
//!
//! assert_eq!(list.descriptors.len(), 2);
//! assert_eq!(list.descriptors[0].local_name, "alice_repo1");
//! assert_eq!(list.descriptors[1].clone_url, "git@github.com:bob/repo2.git");
//! ```
//!
//! ## Core Concepts
//!
//! - **Descriptors (`descriptor`, `repo_list`)**: A repository reference in
//!   shorthand, HTTPS, SSH or SCP-like form is parsed into a clone URL and a
//!   filesystem-safe local name.
//! - **Synchronization (`repository`, `git`)**: Each repository gets one
//!   working copy under the clone root, cloned once and fetched afterwards.
//! - **Archives (`archive`)**: The default branch is archived in full; each
//!   recently active branch gets an archive of only the files it changed.
//! - **Space (`space`)**: Free space is checked before and during a run, and
//!   the backup tree's size is reported at the end.
//! - **Orchestration (`orchestrator`)**: Drives the above per repository and
//!   collects a `RunSummary`.
//!
//! ## Execution Flow
//!
//! 1.  **Admission**: Abort unless the backup root has the minimum free space.
//! 2.  **Sync**: Clone or fetch the repository.
//! 3.  **Full archive**: Check out and archive the default branch.
//! 4.  **Branch scan**: Find remote branches with recent commits.
//! 5.  **Partial archives**: Archive each recent branch's changed files.
//! 6.  **Re-check**: Verify free space before the next repository.
//! 7.  **Report**: Log the backup size and a run summary.

pub mod archive;
pub mod config;
pub mod defaults;
pub mod descriptor;
pub mod error;
pub mod git;
pub mod orchestrator;
pub mod output;
pub mod path;
pub mod repo_list;
pub mod repository;
pub mod space;

#[cfg(test)]
mod path_proptest;

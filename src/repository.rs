//! # Working Copy Synchronization
//!
//! This module keeps one local working copy per repository in step with its
//! remote, and answers the questions the archive step needs: which branch is
//! the default, which other branches saw commits recently, and which files a
//! branch changes relative to the default.
//!
//! ## Design
//!
//! All VCS access goes through the `VcsOperations` trait. `SystemGit` is the
//! production implementation, delegating to the `git` binary through
//! `crate::git`; tests substitute an in-memory mock. Every operation takes
//! the working copy path explicitly.
//!
//! A working copy is a single shared mutable resource: its checked-out
//! branch is global to it. Callers must serialize branch switches within one
//! repository; distinct repositories are independent.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::descriptor::RepositoryDescriptor;
use crate::error::{Error, Result};

/// Default branch assumed when `origin/HEAD` cannot be resolved.
pub const FALLBACK_DEFAULT_BRANCH: &str = "master";

/// A remote branch and the epoch time of its last commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchActivity {
    pub name: String,
    pub last_commit_epoch: i64,
}

/// How the last synchronization of a working copy went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncResult {
    Cloned,
    Updated,
    Failed,
}

/// A local working copy and what is known about it.
#[derive(Debug, Clone)]
pub struct RepositoryState {
    pub local_name: String,
    pub local_path: PathBuf,
    pub default_branch: String,
    pub last_sync_result: SyncResult,
}

/// VCS primitives used by the synchronizer and the archive builder.
pub trait VcsOperations: Send + Sync {
    /// Whether `dir` already holds a working copy.
    fn is_work_tree(&self, dir: &Path) -> bool;

    /// Clone `url` into `target_dir`, including all remote branches.
    fn clone_repo(&self, url: &str, target_dir: &Path) -> Result<()>;

    /// Replace the `origin` URL of an existing working copy.
    fn set_remote_url(&self, dir: &Path, url: &str) -> Result<()>;

    /// Fetch all remotes, pruning deleted remote branches.
    fn fetch_all(&self, dir: &Path) -> Result<()>;

    /// Re-read the remote's default branch pointer. Best effort.
    fn refresh_remote_head(&self, dir: &Path);

    /// The branch recorded as the remote's default, if any.
    fn symbolic_default_branch(&self, dir: &Path) -> Option<String>;

    fn local_branch_exists(&self, dir: &Path, branch: &str) -> bool;

    fn remote_branch_exists(&self, dir: &Path, branch: &str) -> bool;

    /// Check out an existing local branch.
    fn checkout(&self, dir: &Path, branch: &str) -> Result<()>;

    /// Create a local branch tracking the remote one and check it out.
    fn checkout_tracking(&self, dir: &Path, branch: &str) -> Result<()>;

    /// Force the working copy onto the remote branch tip, discarding
    /// local modifications.
    fn checkout_remote_tip(&self, dir: &Path, branch: &str) -> Result<()>;

    /// Fast-forward the checked-out branch to its remote counterpart.
    fn fast_forward(&self, dir: &Path, branch: &str) -> Result<()>;

    /// All remote branches with last commit times, in enumeration order.
    fn remote_branches(&self, dir: &Path) -> Result<Vec<BranchActivity>>;

    /// Paths differing between the tips of `base` and `head`.
    fn diff_names(&self, dir: &Path, base: &str, head: &str) -> Result<Vec<String>>;
}

/// `VcsOperations` backed by the system `git` command.
pub struct SystemGit;

impl VcsOperations for SystemGit {
    fn is_work_tree(&self, dir: &Path) -> bool {
        crate::git::is_work_tree(dir)
    }

    fn clone_repo(&self, url: &str, target_dir: &Path) -> Result<()> {
        crate::git::clone(url, target_dir)
    }

    fn set_remote_url(&self, dir: &Path, url: &str) -> Result<()> {
        crate::git::set_remote_url(dir, url)
    }

    fn fetch_all(&self, dir: &Path) -> Result<()> {
        crate::git::fetch_all(dir)
    }

    fn refresh_remote_head(&self, dir: &Path) {
        crate::git::refresh_remote_head(dir)
    }

    fn symbolic_default_branch(&self, dir: &Path) -> Option<String> {
        crate::git::symbolic_default_branch(dir)
    }

    fn local_branch_exists(&self, dir: &Path, branch: &str) -> bool {
        crate::git::local_branch_exists(dir, branch)
    }

    fn remote_branch_exists(&self, dir: &Path, branch: &str) -> bool {
        crate::git::remote_branch_exists(dir, branch)
    }

    fn checkout(&self, dir: &Path, branch: &str) -> Result<()> {
        crate::git::checkout(dir, branch)
    }

    fn checkout_tracking(&self, dir: &Path, branch: &str) -> Result<()> {
        crate::git::checkout_tracking(dir, branch)
    }

    fn checkout_remote_tip(&self, dir: &Path, branch: &str) -> Result<()> {
        crate::git::checkout_remote_tip(dir, branch)
    }

    fn fast_forward(&self, dir: &Path, branch: &str) -> Result<()> {
        crate::git::fast_forward(dir, branch)
    }

    fn remote_branches(&self, dir: &Path) -> Result<Vec<BranchActivity>> {
        crate::git::remote_branches(dir)
    }

    fn diff_names(&self, dir: &Path, base: &str, head: &str) -> Result<Vec<String>> {
        crate::git::diff_names(dir, base, head)
    }
}

/// Keeps working copies under `clone_root` synchronized with their remotes.
pub struct Synchronizer {
    vcs: Arc<dyn VcsOperations>,
    clone_root: PathBuf,
}

impl Synchronizer {
    pub fn new(vcs: Arc<dyn VcsOperations>, clone_root: PathBuf) -> Self {
        Self { vcs, clone_root }
    }

    /// Directory holding the working copy for `local_name`.
    pub fn local_path(&self, local_name: &str) -> PathBuf {
        self.clone_root.join(local_name)
    }

    /// Clone the repository if it is not present locally, otherwise fetch.
    ///
    /// An existing copy has its `origin` reset to the descriptor's clone URL
    /// first, so token or host changes in the list take effect.
    ///
    /// The returned state has its default branch resolved. Any clone or
    /// fetch error becomes `SyncFailed`.
    pub fn ensure_local_copy(&self, descriptor: &RepositoryDescriptor) -> Result<RepositoryState> {
        let name = &descriptor.local_name;
        let local_path = self.local_path(name);
        let sync_failed = |e: Error| Error::SyncFailed {
            repo: name.clone(),
            message: e.to_string(),
        };

        let last_sync_result = if self.vcs.is_work_tree(&local_path) {
            info!("[{}] Fetching updates", name);
            self.vcs
                .set_remote_url(&local_path, &descriptor.clone_url)
                .map_err(sync_failed)?;
            self.vcs.fetch_all(&local_path).map_err(sync_failed)?;
            self.vcs.refresh_remote_head(&local_path);
            SyncResult::Updated
        } else {
            if local_path.exists() {
                warn!(
                    "[{}] {} exists but is not a working copy, replacing it",
                    name,
                    local_path.display()
                );
                fs::remove_dir_all(&local_path).map_err(|e| sync_failed(e.into()))?;
            }
            info!("[{}] Cloning {}", name, descriptor.display_url());
            self.vcs
                .clone_repo(&descriptor.clone_url, &local_path)
                .map_err(sync_failed)?;
            self.vcs.fetch_all(&local_path).map_err(sync_failed)?;
            SyncResult::Cloned
        };

        let mut state = RepositoryState {
            local_name: name.clone(),
            local_path,
            default_branch: String::new(),
            last_sync_result,
        };
        state.default_branch = self.resolve_default_branch(&state);
        Ok(state)
    }

    /// The remote's recorded default branch, or `master` when unknown.
    ///
    /// The fallback can mislabel repositories using another trunk name; a
    /// warning is logged when `origin/master` does not even exist.
    pub fn resolve_default_branch(&self, state: &RepositoryState) -> String {
        if let Some(branch) = self.vcs.symbolic_default_branch(&state.local_path) {
            return branch;
        }

        if !self
            .vcs
            .remote_branch_exists(&state.local_path, FALLBACK_DEFAULT_BRANCH)
        {
            warn!(
                "[{}] Default branch unresolvable and no remote '{}' exists; full archives may be mislabelled",
                state.local_name, FALLBACK_DEFAULT_BRANCH
            );
        } else {
            debug!(
                "[{}] Falling back to default branch '{}'",
                state.local_name, FALLBACK_DEFAULT_BRANCH
            );
        }
        FALLBACK_DEFAULT_BRANCH.to_string()
    }

    /// Check out the default branch, creating a tracking branch if needed.
    pub fn checkout_default(&self, state: &RepositoryState) -> Result<()> {
        let branch = &state.default_branch;
        let result = if self.vcs.local_branch_exists(&state.local_path, branch) {
            self.vcs.checkout(&state.local_path, branch)
        } else {
            self.vcs.checkout_tracking(&state.local_path, branch)
        };
        result.map_err(|e| Error::CheckoutFailed {
            repo: state.local_name.clone(),
            branch: branch.clone(),
            message: e.to_string(),
        })
    }

    /// Check out the default branch and bring it up to date with the remote.
    ///
    /// A failed fast-forward only logs a warning: the stale checkout is still
    /// worth archiving.
    pub fn sync_default_branch(&self, state: &RepositoryState) -> Result<()> {
        self.checkout_default(state)?;
        if let Err(e) = self
            .vcs
            .fast_forward(&state.local_path, &state.default_branch)
        {
            warn!(
                "[{}] Could not update '{}', archiving the existing checkout: {}",
                state.local_name, state.default_branch, e
            );
        }
        Ok(())
    }

    /// Non-default remote branches with a commit newer than the threshold.
    pub fn list_recent_branches(
        &self,
        state: &RepositoryState,
        threshold_hours: f64,
        now_epoch: i64,
    ) -> Result<Vec<BranchActivity>> {
        let branches = self.vcs.remote_branches(&state.local_path)?;
        Ok(filter_recent(
            branches,
            &state.default_branch,
            now_epoch,
            threshold_hours,
        ))
    }

    /// Files differing between the default branch and `branch`.
    ///
    /// Returns an empty list when the diff cannot be computed.
    pub fn diff_against_default(&self, state: &RepositoryState, branch: &str) -> Vec<String> {
        match self
            .vcs
            .diff_names(&state.local_path, &state.default_branch, branch)
        {
            Ok(files) => files,
            Err(e) => {
                warn!(
                    "[{}] Diff of '{}' against '{}' failed: {}",
                    state.local_name, branch, state.default_branch, e
                );
                Vec::new()
            }
        }
    }
}

/// Keep branches other than `default_branch` and `HEAD` whose last commit is
/// strictly newer than `now_epoch - threshold_hours * 3600`.
///
/// Input order is preserved.
pub fn filter_recent(
    branches: Vec<BranchActivity>,
    default_branch: &str,
    now_epoch: i64,
    threshold_hours: f64,
) -> Vec<BranchActivity> {
    let cutoff = now_epoch - (threshold_hours * 3600.0).round() as i64;
    branches
        .into_iter()
        .filter(|b| b.name != default_branch && b.name != "HEAD")
        .filter(|b| b.last_commit_epoch > cutoff)
        .collect()
}


#[cfg(test)]
mod tests {
    use super::mock::{MockRemote, MockVcs};
    use super::*;
    use crate::descriptor::DescriptorParser;
    use tempfile::TempDir;

    fn activity(name: &str, epoch: i64) -> BranchActivity {
        BranchActivity {
            name: name.to_string(),
            last_commit_epoch: epoch,
        }
    }

    fn remote_with_main() -> MockRemote {
        let mut remote = MockRemote {
            default_branch: Some("main".to_string()),
            branches: vec![activity("main", 100), activity("feature", 200)],
            ..Default::default()
        };
        remote
            .trees
            .insert("main".to_string(), vec![("README.md".into(), "hi".into())]);
        remote
    }

    #[test]
    fn test_filter_recent_boundary_is_exclusive() {
        let now = 1_700_000_000;
        let threshold_hours = 24.5;
        let cutoff = now - 88_200;
        let branches = vec![
            activity("at-cutoff", cutoff),
            activity("one-second-newer", cutoff + 1),
            activity("old", cutoff - 500),
        ];
        let recent = filter_recent(branches, "main", now, threshold_hours);
        let names: Vec<&str> = recent.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["one-second-newer"]);
    }

    #[test]
    fn test_filter_recent_excludes_default_and_head_and_keeps_order() {
        let now = 10_000;
        let branches = vec![
            activity("zeta", 9_999),
            activity("main", 9_999),
            activity("HEAD", 9_999),
            activity("alpha", 9_500),
        ];
        let recent = filter_recent(branches, "main", now, 1.0);
        let names: Vec<&str> = recent.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_ensure_local_copy_clones_then_updates() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(MockVcs::new());
        let descriptor = DescriptorParser::new(None).parse("alice/repo1").unwrap();
        vcs.add_remote(&descriptor.clone_url, remote_with_main());
        let sync = Synchronizer::new(vcs.clone(), temp_dir.path().to_path_buf());

        let first = sync.ensure_local_copy(&descriptor).unwrap();
        assert_eq!(first.last_sync_result, SyncResult::Cloned);
        assert_eq!(first.default_branch, "main");
        assert_eq!(first.local_path, temp_dir.path().join("alice_repo1"));

        let second = sync.ensure_local_copy(&descriptor).unwrap();
        assert_eq!(second.last_sync_result, SyncResult::Updated);
        assert_eq!(vcs.calls_matching("clone"), 1);
        assert_eq!(vcs.calls_matching("fetch"), 2);
    }

    #[test]
    fn test_ensure_local_copy_updates_origin_when_clone_url_changes() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(MockVcs::new());
        let plain = DescriptorParser::new(None).parse("alice/repo1").unwrap();
        let with_token = DescriptorParser::new(Some("rotated".to_string()))
            .parse("alice/repo1")
            .unwrap();
        assert_ne!(plain.clone_url, with_token.clone_url);
        vcs.add_remote(&plain.clone_url, remote_with_main());
        let sync = Synchronizer::new(vcs.clone(), temp_dir.path().to_path_buf());
        sync.ensure_local_copy(&plain).unwrap();

        // Only the new URL is reachable from now on.
        vcs.remotes.lock().unwrap().clear();
        vcs.add_remote(&with_token.clone_url, remote_with_main());

        let state = sync.ensure_local_copy(&with_token).unwrap();
        assert_eq!(state.last_sync_result, SyncResult::Updated);
        assert_eq!(vcs.calls_matching("clone"), 1);
        assert_eq!(vcs.calls_matching("set-url"), 1);
        assert_eq!(
            vcs.clones.lock().unwrap().get(&state.local_path),
            Some(&with_token.clone_url)
        );
    }

    #[test]
    fn test_ensure_local_copy_replaces_non_repository_directory() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(MockVcs::new());
        let descriptor = DescriptorParser::new(None).parse("alice/repo1").unwrap();
        vcs.add_remote(&descriptor.clone_url, remote_with_main());
        let leftover = temp_dir.path().join("alice_repo1");
        fs::create_dir_all(&leftover).unwrap();
        fs::write(leftover.join("partial"), "x").unwrap();

        let sync = Synchronizer::new(vcs, temp_dir.path().to_path_buf());
        let state = sync.ensure_local_copy(&descriptor).unwrap();
        assert_eq!(state.last_sync_result, SyncResult::Cloned);
        assert!(!leftover.join("partial").exists());
    }

    #[test]
    fn test_ensure_local_copy_clone_failure_is_sync_failed() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(MockVcs::new());
        let descriptor = DescriptorParser::new(None).parse("alice/missing").unwrap();
        let sync = Synchronizer::new(vcs, temp_dir.path().to_path_buf());

        let result = sync.ensure_local_copy(&descriptor);
        match result {
            Err(e @ Error::SyncFailed { .. }) => assert!(!e.is_fatal()),
            other => panic!("expected SyncFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_default_branch_falls_back_to_master() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(MockVcs::new());
        let descriptor = DescriptorParser::new(None).parse("alice/repo1").unwrap();
        let mut remote = remote_with_main();
        remote.default_branch = None;
        vcs.add_remote(&descriptor.clone_url, remote);
        let sync = Synchronizer::new(vcs, temp_dir.path().to_path_buf());

        let state = sync.ensure_local_copy(&descriptor).unwrap();
        assert_eq!(state.default_branch, FALLBACK_DEFAULT_BRANCH);
    }

    #[test]
    fn test_sync_default_branch_tracks_then_reuses_local_branch() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(MockVcs::new());
        let descriptor = DescriptorParser::new(None).parse("alice/repo1").unwrap();
        vcs.add_remote(&descriptor.clone_url, remote_with_main());
        let sync = Synchronizer::new(vcs.clone(), temp_dir.path().to_path_buf());
        let state = sync.ensure_local_copy(&descriptor).unwrap();

        sync.sync_default_branch(&state).unwrap();
        assert_eq!(vcs.calls_matching("track"), 1);
        assert!(state.local_path.join("README.md").exists());

        sync.sync_default_branch(&state).unwrap();
        assert_eq!(vcs.calls_matching("track"), 1);
        assert_eq!(vcs.calls_matching("checkout"), 1);
        assert_eq!(vcs.calls_matching("ff"), 2);
    }

    #[test]
    fn test_sync_default_branch_tolerates_fast_forward_failure() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(MockVcs {
            fail_fast_forward: true,
            ..Default::default()
        });
        let descriptor = DescriptorParser::new(None).parse("alice/repo1").unwrap();
        vcs.add_remote(&descriptor.clone_url, remote_with_main());
        let sync = Synchronizer::new(vcs, temp_dir.path().to_path_buf());
        let state = sync.ensure_local_copy(&descriptor).unwrap();

        assert!(sync.sync_default_branch(&state).is_ok());
    }

    #[test]
    fn test_sync_default_branch_unknown_branch_is_checkout_failed() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(MockVcs::new());
        let descriptor = DescriptorParser::new(None).parse("alice/repo1").unwrap();
        let mut remote = remote_with_main();
        remote.default_branch = Some("trunk".to_string());
        vcs.add_remote(&descriptor.clone_url, remote);
        let sync = Synchronizer::new(vcs, temp_dir.path().to_path_buf());
        let state = sync.ensure_local_copy(&descriptor).unwrap();

        assert!(matches!(
            sync.sync_default_branch(&state),
            Err(Error::CheckoutFailed { .. })
        ));
    }

    #[test]
    fn test_diff_against_default_failure_yields_empty() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(MockVcs::new());
        let descriptor = DescriptorParser::new(None).parse("alice/repo1").unwrap();
        let mut remote = remote_with_main();
        remote
            .diffs
            .insert("feature".to_string(), vec!["a.txt".to_string()]);
        vcs.add_remote(&descriptor.clone_url, remote);
        let sync = Synchronizer::new(vcs, temp_dir.path().to_path_buf());
        let state = sync.ensure_local_copy(&descriptor).unwrap();

        assert_eq!(sync.diff_against_default(&state, "feature"), vec!["a.txt"]);
        assert!(sync.diff_against_default(&state, "unknown").is_empty());
    }

    #[test]
    fn test_list_recent_branches_uses_remote_listing() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(MockVcs::new());
        let descriptor = DescriptorParser::new(None).parse("alice/repo1").unwrap();
        vcs.add_remote(&descriptor.clone_url, remote_with_main());
        let sync = Synchronizer::new(vcs, temp_dir.path().to_path_buf());
        let state = sync.ensure_local_copy(&descriptor).unwrap();

        let recent = sync.list_recent_branches(&state, 1.0, 3_000).unwrap();
        assert_eq!(recent, vec![activity("feature", 200)]);
    }
}

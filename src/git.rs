//! # Git Command Wrappers
//!
//! Thin wrappers around the system `git` binary. Every function takes the
//! working copy path explicitly and runs `git -C <dir> ...`, so nothing here
//! ever changes the process's current directory.
//!
//! All parsing of git's textual output lives in this module; callers only
//! see typed values (`BranchActivity`, path lists, branch names).
//!
//! Using the system git means authentication is handled the usual way:
//! - SSH keys from ~/.ssh/ or the running ssh-agent
//! - Git credential helpers
//! - Tokens embedded in HTTPS URLs

use std::fs;
use std::io;
use std::path::Path;
use std::process::{Command, Output};

use log::debug;

use crate::descriptor::redact_url;
use crate::error::{Error, Result};
use crate::repository::BranchActivity;

/// Remote name used for every working copy.
pub const REMOTE: &str = "origin";

fn git(dir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.arg("-C")
        .arg(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("LC_ALL", "C");
    cmd
}

fn output_of(dir: &Path, args: &[&str]) -> Result<Output> {
    git(dir).args(args).output().map_err(|e| Error::GitCommand {
        command: args.join(" "),
        dir: dir.to_path_buf(),
        stderr: e.to_string(),
    })
}

/// Run `git -C dir <args>` and return stdout, failing on a non-zero exit.
fn run(dir: &Path, args: &[&str]) -> Result<String> {
    let output = output_of(dir, args)?;
    if !output.status.success() {
        return Err(Error::GitCommand {
            command: args.join(" "),
            dir: dir.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a command whose only interesting outcome is its exit status.
fn succeeds(dir: &Path, args: &[&str]) -> bool {
    output_of(dir, args)
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Clone `url` into `target_dir` with all remote branches.
pub fn clone(url: &str, target_dir: &Path) -> Result<()> {
    if let Some(parent) = target_dir.parent() {
        fs::create_dir_all(parent)?;
    }

    let output = Command::new("git")
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("LC_ALL", "C")
        .args(["clone", "--no-single-branch", url])
        .arg(target_dir)
        .output()
        .map_err(|e| Error::GitCommand {
            command: format!("clone {}", redact_url(url)),
            dir: target_dir.to_path_buf(),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = redact_url_in(&String::from_utf8_lossy(&output.stderr), url);

        let message = if stderr.contains("Authentication failed")
            || stderr.contains("Permission denied")
            || stderr.contains("Could not read from remote repository")
            || stderr.contains("could not read Username")
        {
            format!(
                "Authentication failed. Check the configured token or SSH identity.\n\
                Git error: {}",
                stderr.trim()
            )
        } else {
            stderr.trim().to_string()
        };

        return Err(Error::GitCommand {
            command: format!("clone {}", redact_url(url)),
            dir: target_dir.to_path_buf(),
            stderr: message,
        });
    }

    Ok(())
}

fn redact_url_in(text: &str, url: &str) -> String {
    text.replace(url, &redact_url(url))
}

/// Point `origin` at `url`, so a rotated token or moved remote is used by
/// the next fetch.
pub fn set_remote_url(dir: &Path, url: &str) -> Result<()> {
    run(dir, &["remote", "set-url", REMOTE, url])
        .map(|_| ())
        .map_err(|e| match e {
            Error::GitCommand { dir, stderr, .. } => Error::GitCommand {
                command: format!("remote set-url {} {}", REMOTE, redact_url(url)),
                dir,
                stderr: redact_url_in(&stderr, url),
            },
            other => other,
        })
}

/// Fetch every remote, dropping remote-tracking refs deleted upstream.
pub fn fetch_all(dir: &Path) -> Result<()> {
    run(dir, &["fetch", "--all", "--prune"]).map(|_| ())
}

/// Refresh `origin/HEAD` from the remote. Failure leaves the old value.
pub fn refresh_remote_head(dir: &Path) {
    if !succeeds(dir, &["remote", "set-head", REMOTE, "--auto"]) {
        debug!("Could not refresh {}/HEAD in {}", REMOTE, dir.display());
    }
}

/// Branch name recorded in `origin/HEAD`, if any.
pub fn symbolic_default_branch(dir: &Path) -> Option<String> {
    let head = format!("refs/remotes/{}/HEAD", REMOTE);
    run(dir, &["symbolic-ref", "--short", "-q", &head])
        .ok()
        .and_then(|out| parse_symbolic_ref(&out))
}

/// Parse `symbolic-ref --short` output such as `origin/main`.
pub fn parse_symbolic_ref(output: &str) -> Option<String> {
    let short = output.trim();
    let branch = short
        .strip_prefix(REMOTE)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(short);
    if branch.is_empty() {
        None
    } else {
        Some(branch.to_string())
    }
}

/// Whether `refs/heads/<branch>` exists.
pub fn local_branch_exists(dir: &Path, branch: &str) -> bool {
    let refname = format!("refs/heads/{}", branch);
    succeeds(dir, &["rev-parse", "--verify", "--quiet", &refname])
}

/// Whether `refs/remotes/origin/<branch>` exists.
pub fn remote_branch_exists(dir: &Path, branch: &str) -> bool {
    let refname = format!("refs/remotes/{}/{}", REMOTE, branch);
    succeeds(dir, &["rev-parse", "--verify", "--quiet", &refname])
}

/// Check out an existing local branch.
pub fn checkout(dir: &Path, branch: &str) -> Result<()> {
    run(dir, &["checkout", "-f", branch]).map(|_| ())
}

/// Create a local branch tracking `origin/<branch>` and check it out.
pub fn checkout_tracking(dir: &Path, branch: &str) -> Result<()> {
    let upstream = format!("{}/{}", REMOTE, branch);
    run(dir, &["checkout", "-f", "-b", branch, "--track", &upstream]).map(|_| ())
}

/// Force the working copy onto the tip of `origin/<branch>` (detached),
/// discarding local modifications.
pub fn checkout_remote_tip(dir: &Path, branch: &str) -> Result<()> {
    let upstream = format!("{}/{}", REMOTE, branch);
    run(dir, &["checkout", "-f", "--detach", &upstream]).map(|_| ())
}

/// Fast-forward the checked-out branch to `origin/<branch>`.
pub fn fast_forward(dir: &Path, branch: &str) -> Result<()> {
    let upstream = format!("{}/{}", REMOTE, branch);
    run(dir, &["merge", "--ff-only", &upstream]).map(|_| ())
}

/// Every `origin/*` branch with its last commit time, in ref order.
pub fn remote_branches(dir: &Path) -> Result<Vec<BranchActivity>> {
    let prefix = format!("refs/remotes/{}/", REMOTE);
    let out = run(
        dir,
        &[
            "for-each-ref",
            "--format=%(refname)%09%(committerdate:unix)",
            &prefix,
        ],
    )?;
    Ok(parse_remote_branches(&out))
}

/// Parse `for-each-ref` lines of the form `refs/remotes/origin/<name>\t<epoch>`.
///
/// The synthetic `HEAD` pointer and malformed lines are dropped.
pub fn parse_remote_branches(output: &str) -> Vec<BranchActivity> {
    let prefix = format!("refs/remotes/{}/", REMOTE);
    output
        .lines()
        .filter_map(|line| {
            let (refname, epoch) = line.split_once('\t')?;
            let name = refname.strip_prefix(&prefix)?;
            if name.is_empty() || name == "HEAD" {
                return None;
            }
            match epoch.trim().parse::<i64>() {
                Ok(last_commit_epoch) => Some(BranchActivity {
                    name: name.to_string(),
                    last_commit_epoch,
                }),
                Err(_) => {
                    debug!("Skipping unparsable ref line: {}", line);
                    None
                }
            }
        })
        .collect()
}

/// Paths that differ between `origin/<base>` and `origin/<head>`.
pub fn diff_names(dir: &Path, base: &str, head: &str) -> Result<Vec<String>> {
    let base = format!("{}/{}", REMOTE, base);
    let head = format!("{}/{}", REMOTE, head);
    let out = run(dir, &["diff", "--name-only", "-z", &base, &head])?;
    Ok(parse_name_list(&out))
}

/// Split NUL-separated `--name-only -z` output.
pub fn parse_name_list(output: &str) -> Vec<String> {
    output
        .split('\0')
        .map(|s| s.trim_end_matches('\n'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `dir` holds a git working copy.
pub fn is_work_tree(dir: &Path) -> bool {
    dir.join(".git").exists()
}

/// Whether a `git` binary can be spawned at all.
pub fn available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or_else(|e: io::Error| {
            debug!("git not available: {}", e);
            false
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_parse_symbolic_ref() {
        assert_eq!(parse_symbolic_ref("origin/main\n"), Some("main".to_string()));
        assert_eq!(
            parse_symbolic_ref("origin/release/2.x"),
            Some("release/2.x".to_string())
        );
        assert_eq!(parse_symbolic_ref(""), None);
        assert_eq!(parse_symbolic_ref("origin/"), None);
    }

    #[test]
    fn test_parse_remote_branches() {
        let out = "refs/remotes/origin/HEAD\t1700000000\n\
                   refs/remotes/origin/main\t1700000100\n\
                   refs/remotes/origin/feature/login\t1700000200\n\
                   refs/remotes/origin/broken\tnot-a-number\n\
                   garbage line\n";
        let branches = parse_remote_branches(out);
        assert_eq!(
            branches,
            vec![
                BranchActivity {
                    name: "main".to_string(),
                    last_commit_epoch: 1_700_000_100,
                },
                BranchActivity {
                    name: "feature/login".to_string(),
                    last_commit_epoch: 1_700_000_200,
                },
            ]
        );
    }

    #[test]
    fn test_parse_name_list() {
        assert_eq!(
            parse_name_list("src/a.rs\0dir with space/b.txt\0"),
            vec!["src/a.rs".to_string(), "dir with space/b.txt".to_string()]
        );
        assert!(parse_name_list("").is_empty());
    }

    /// Run git with a fixed identity and commit date inside `dir`.
    fn git_at(dir: &Path, epoch: i64, args: &[&str]) {
        let date = format!("@{} +0000", epoch);
        let status = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
            .args(args)
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_DATE", &date)
            .output()
            .unwrap();
        assert!(
            status.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&status.stderr)
        );
    }

    /// Build an origin repository with `main` and a `feature/x` branch.
    fn make_origin(root: &Path) -> PathBuf {
        let origin = root.join("origin");
        fs::create_dir_all(&origin).unwrap();
        git_at(&origin, 1_700_000_000, &["init", "-q", "-b", "main"]);
        fs::write(origin.join("README.md"), "hello").unwrap();
        fs::write(origin.join("old.txt"), "old").unwrap();
        git_at(&origin, 1_700_000_000, &["add", "."]);
        git_at(&origin, 1_700_000_000, &["commit", "-q", "-m", "init"]);
        git_at(&origin, 1_700_000_000, &["checkout", "-q", "-b", "feature/x"]);
        fs::write(origin.join("new.txt"), "new").unwrap();
        fs::remove_file(origin.join("old.txt")).unwrap();
        git_at(&origin, 1_700_003_600, &["add", "-A"]);
        git_at(&origin, 1_700_003_600, &["commit", "-q", "-m", "feature"]);
        git_at(&origin, 1_700_003_600, &["checkout", "-q", "main"]);
        origin
    }

    #[test]
    fn test_clone_list_and_diff_against_local_origin() {
        if !available() {
            eprintln!("git not installed, skipping");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let origin = make_origin(temp_dir.path());
        let work = temp_dir.path().join("clones").join("me_origin");

        clone(origin.to_str().unwrap(), &work).unwrap();
        assert!(is_work_tree(&work));
        assert_eq!(symbolic_default_branch(&work), Some("main".to_string()));
        assert!(remote_branch_exists(&work, "feature/x"));
        assert!(local_branch_exists(&work, "main"));
        assert!(!local_branch_exists(&work, "feature/x"));

        let branches = remote_branches(&work).unwrap();
        let feature = branches.iter().find(|b| b.name == "feature/x").unwrap();
        assert_eq!(feature.last_commit_epoch, 1_700_003_600);
        assert!(branches.iter().all(|b| b.name != "HEAD"));

        let mut diff = diff_names(&work, "main", "feature/x").unwrap();
        diff.sort();
        assert_eq!(diff, vec!["new.txt".to_string(), "old.txt".to_string()]);

        checkout_remote_tip(&work, "feature/x").unwrap();
        assert!(work.join("new.txt").exists());
        assert!(!work.join("old.txt").exists());

        checkout(&work, "main").unwrap();
        assert!(work.join("old.txt").exists());
        fetch_all(&work).unwrap();
        fast_forward(&work, "main").unwrap();
    }

    #[test]
    fn test_set_remote_url_follows_moved_origin() {
        if !available() {
            eprintln!("git not installed, skipping");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let origin = make_origin(temp_dir.path());
        let work = temp_dir.path().join("clones").join("me_origin");
        clone(origin.to_str().unwrap(), &work).unwrap();

        let moved = temp_dir.path().join("moved");
        fs::rename(&origin, &moved).unwrap();
        assert!(fetch_all(&work).is_err());

        set_remote_url(&work, moved.to_str().unwrap()).unwrap();
        fetch_all(&work).unwrap();
        assert!(remote_branch_exists(&work, "feature/x"));
    }

    #[test]
    fn test_clone_failure_is_git_command_error() {
        if !available() {
            eprintln!("git not installed, skipping");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("does-not-exist");
        let result = clone(missing.to_str().unwrap(), &temp_dir.path().join("work"));
        assert!(matches!(result, Err(Error::GitCommand { .. })));
    }
}

//! # Repository Descriptor Parsing
//!
//! Turns one line of free text from the repository list into a
//! `RepositoryDescriptor`: the URL to clone from and the local name used for
//! both the working copy directory and the backup subtree.
//!
//! ## Accepted shapes
//!
//! - `owner/repo` shorthand, resolved against the default host
//! - `https://host/owner/repo[.git]`
//! - `git@host:owner/repo[.git]`
//! - `ssh://[user@]host[:port]/owner/repo[.git]`
//!
//! Every shape for the same repository yields the same `local_name`
//! (`{owner}_{repo}`), so repeated runs and mixed notations always address
//! the same working copy. Owners may not contain `_`, which keeps the join
//! unambiguous.
//!
//! ## Credentials
//!
//! When a token is configured, HTTPS clone URLs carry it as the URL
//! user-info. SSH URLs are never rewritten; SSH authentication comes from the
//! ambient agent or identity files.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{Error, Result};
use crate::path::is_safe_component;

/// Host used for `owner/repo` shorthand unless configured otherwise.
pub const DEFAULT_HOST: &str = "github.com";

static SCP_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<user>[A-Za-z0-9._-]+)@(?P<host>[A-Za-z0-9.-]+):(?P<path>[^\s]+)$")
        .expect("static regex is valid")
});

static SHORTHAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<owner>[^/\s:@]+)/(?P<repo>[^/\s:@]+)$").expect("static regex is valid")
});

/// A normalized repository reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    /// The line as it appeared in the repository list (trimmed).
    pub source_ref: String,
    /// URL handed to `git clone`, credentials included.
    pub clone_url: String,
    /// Filesystem-safe `{owner}_{repo}` name.
    pub local_name: String,
}

impl RepositoryDescriptor {
    /// The clone URL with any embedded credential masked, for logging.
    pub fn display_url(&self) -> String {
        redact_url(&self.clone_url)
    }
}

/// Replace URL user-info with `***` when it carries a secret.
///
/// SSH user names such as `git@` are not secrets and are kept.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.scheme() == "https" || url.scheme() == "http" => {
            if url.username().is_empty() && url.password().is_none() {
                return raw.to_string();
            }
            let _ = url.set_password(None);
            let _ = url.set_username("***");
            url.to_string()
        }
        _ => raw.to_string(),
    }
}

/// Parses repository references, injecting credentials into HTTPS URLs.
#[derive(Debug, Clone)]
pub struct DescriptorParser {
    token: Option<String>,
    default_host: String,
}

impl DescriptorParser {
    /// Create a parser resolving shorthand against `github.com`.
    pub fn new(token: Option<String>) -> Self {
        Self::with_host(token, DEFAULT_HOST)
    }

    /// Create a parser resolving shorthand against `default_host`.
    pub fn with_host(token: Option<String>, default_host: &str) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
            default_host: default_host.trim_end_matches('/').to_string(),
        }
    }

    /// Parse one repository reference.
    pub fn parse(&self, text: &str) -> Result<RepositoryDescriptor> {
        let source_ref = text.trim();
        if source_ref.is_empty() {
            return Err(invalid(source_ref, "empty reference"));
        }

        if source_ref.starts_with("https://") {
            self.parse_https(source_ref)
        } else if source_ref.starts_with("ssh://") {
            parse_ssh_url(source_ref)
        } else if let Some(caps) = SCP_LIKE.captures(source_ref) {
            let (owner, repo) = split_owner_repo(source_ref, &caps["path"])?;
            Ok(RepositoryDescriptor {
                source_ref: source_ref.to_string(),
                clone_url: format!("{}@{}:{}/{}.git", &caps["user"], &caps["host"], owner, repo),
                local_name: local_name(owner, repo),
            })
        } else if let Some(caps) = SHORTHAND.captures(source_ref) {
            let (owner, repo) = validate_segments(source_ref, &caps["owner"], &caps["repo"])?;
            let url = Url::parse(&format!(
                "https://{}/{}/{}.git",
                self.default_host, owner, repo
            ))?;
            Ok(RepositoryDescriptor {
                source_ref: source_ref.to_string(),
                clone_url: self.inject_token(source_ref, url)?,
                local_name: local_name(owner, repo),
            })
        } else {
            Err(invalid(
                source_ref,
                "expected owner/repo, an HTTPS URL or an SSH URL",
            ))
        }
    }

    fn parse_https(&self, source_ref: &str) -> Result<RepositoryDescriptor> {
        let parsed = Url::parse(source_ref).map_err(|e| invalid(source_ref, &e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| invalid(source_ref, "URL has no host"))?;
        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(invalid(source_ref, "URL must not carry a query or fragment"));
        }
        let (owner, repo) = split_owner_repo(source_ref, parsed.path())?;

        let authority = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let url = Url::parse(&format!("https://{}/{}/{}.git", authority, owner, repo))?;
        Ok(RepositoryDescriptor {
            source_ref: source_ref.to_string(),
            clone_url: self.inject_token(source_ref, url)?,
            local_name: local_name(owner, repo),
        })
    }

    fn inject_token(&self, source_ref: &str, mut url: Url) -> Result<String> {
        if let Some(token) = &self.token {
            url.set_username(token)
                .map_err(|_| invalid(source_ref, "URL cannot carry credentials"))?;
        }
        Ok(url.to_string())
    }
}

fn parse_ssh_url(source_ref: &str) -> Result<RepositoryDescriptor> {
    let parsed = Url::parse(source_ref).map_err(|e| invalid(source_ref, &e.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| invalid(source_ref, "URL has no host"))?;
    let (owner, repo) = split_owner_repo(source_ref, parsed.path())?;

    let mut clone_url = String::from("ssh://");
    if !parsed.username().is_empty() {
        clone_url.push_str(parsed.username());
        clone_url.push('@');
    }
    clone_url.push_str(host);
    if let Some(port) = parsed.port() {
        clone_url.push_str(&format!(":{}", port));
    }
    clone_url.push_str(&format!("/{}/{}.git", owner, repo));

    Ok(RepositoryDescriptor {
        source_ref: source_ref.to_string(),
        clone_url,
        local_name: local_name(owner, repo),
    })
}

/// Split `/owner/repo[.git][/]` into its two validated segments.
fn split_owner_repo<'a>(source_ref: &str, path: &'a str) -> Result<(&'a str, &'a str)> {
    let trimmed = path.trim_matches('/');
    let mut segments = trimmed.split('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(owner), Some(repo), None) => validate_segments(source_ref, owner, repo),
        _ => Err(invalid(source_ref, "path must be exactly owner/repo")),
    }
}

fn validate_segments<'a>(
    source_ref: &str,
    owner: &'a str,
    repo: &'a str,
) -> Result<(&'a str, &'a str)> {
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if !is_safe_component(owner) || owner.contains('_') {
        return Err(invalid(
            source_ref,
            &format!("owner '{}' must match [A-Za-z0-9.-]+", owner),
        ));
    }
    if !is_safe_component(repo) {
        return Err(invalid(
            source_ref,
            &format!("repository '{}' must match [A-Za-z0-9._-]+", repo),
        ));
    }
    Ok((owner, repo))
}

fn local_name(owner: &str, repo: &str) -> String {
    format!("{}_{}", owner, repo)
}

fn invalid(reference: &str, message: &str) -> Error {
    Error::InvalidReference {
        reference: reference.to_string(),
        message: message.to_string(),
    }
}

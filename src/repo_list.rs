//! Reading the repository list source

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::warn;

use crate::descriptor::{redact_url, DescriptorParser, RepositoryDescriptor};
use crate::error::{Error, Result};

/// A list line that could not be parsed.
#[derive(Debug)]
pub struct InvalidLine {
    /// 1-based line number in the list source.
    pub line_number: usize,
    pub error: Error,
}

/// Parsed contents of a repository list.
#[derive(Debug, Default)]
pub struct RepoList {
    pub descriptors: Vec<RepositoryDescriptor>,
    pub invalid: Vec<InvalidLine>,
    /// Lines skipped because an earlier line resolved to the same local name.
    pub duplicates: usize,
}

/// Read the repository list at `path`.
///
/// Failure to read the file is fatal (`ListSourceMissing`); failure to parse
/// a line is recorded in `RepoList::invalid` and the line is skipped.
pub fn load(path: &Path, parser: &DescriptorParser) -> Result<RepoList> {
    let content = fs::read_to_string(path).map_err(|e| Error::ListSourceMissing {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(parse(&content, parser))
}

/// Parse repository list text: one reference per line, blank lines and
/// `#` comments ignored.
pub fn parse(content: &str, parser: &DescriptorParser) -> RepoList {
    let mut list = RepoList::default();
    let mut seen = HashSet::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match parser.parse(line) {
            Ok(descriptor) => {
                if seen.insert(descriptor.local_name.clone()) {
                    list.descriptors.push(descriptor);
                } else {
                    warn!(
                        "Line {}: '{}' duplicates an earlier entry for {}, skipping",
                        index + 1,
                        redact_url(line),
                        descriptor.local_name
                    );
                    list.duplicates += 1;
                }
            }
            Err(error) => {
                warn!("Line {}: {}", index + 1, error);
                list.invalid.push(InvalidLine {
                    line_number: index + 1,
                    error,
                });
            }
        }
    }

    list
}

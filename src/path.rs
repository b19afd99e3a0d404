//! Path component helpers

/// Encode a branch name into a single filesystem-safe path component.
///
/// Every character outside `[A-Za-z0-9._-]` becomes `_`, so
/// `feature/login` maps to `feature_login`. The mapping is 1:1 per
/// character and never produces a path separator.
pub fn safe_branch_label(branch: &str) -> String {
    branch
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Whether `segment` is usable verbatim as one path component.
///
/// Accepts non-empty `[A-Za-z0-9._-]+` strings other than `.` and `..`.
pub fn is_safe_component(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
}

//! Property-based tests for path labels and repository descriptors.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::descriptor::DescriptorParser;
    use crate::path::{is_safe_component, safe_branch_label};
    use proptest::prelude::*;

    // ============================================================================
    // safe_branch_label property tests
    // ============================================================================

    proptest! {
        /// Property: safe_branch_label only ever emits [A-Za-z0-9._-]
        #[test]
        fn safe_branch_label_only_emits_allowed_chars(input in ".*") {
            let result = safe_branch_label(&input);
            prop_assert!(
                result
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_'),
                "safe_branch_label produced '{}' from '{}'",
                result,
                input
            );
        }

        /// Property: characters are replaced 1:1
        #[test]
        fn safe_branch_label_preserves_char_count(input in ".*") {
            let result = safe_branch_label(&input);
            prop_assert_eq!(result.chars().count(), input.chars().count());
        }

        /// Property: already-safe names pass through unchanged
        #[test]
        fn safe_branch_label_is_identity_on_safe_names(input in "[A-Za-z0-9._-]+") {
            prop_assert_eq!(safe_branch_label(&input), input);
        }

        /// Property: labelling is idempotent
        #[test]
        fn safe_branch_label_is_idempotent(input in ".*") {
            let once = safe_branch_label(&input);
            prop_assert_eq!(safe_branch_label(&once), once.clone());
        }
    }

    // ============================================================================
    // Descriptor property tests
    // ============================================================================

    proptest! {
        /// Property: every accepted reference form yields the same local name
        #[test]
        fn all_reference_forms_share_local_name(
            owner in "[A-Za-z0-9][A-Za-z0-9-]{0,15}",
            repo in "[A-Za-z0-9][A-Za-z0-9._-]{0,15}",
        ) {
            // A trailing ".git" is stripped from every form.
            prop_assume!(!repo.ends_with(".git"));
            let parser = DescriptorParser::new(None);
            let forms = [
                format!("{owner}/{repo}"),
                format!("https://github.com/{owner}/{repo}"),
                format!("https://github.com/{owner}/{repo}.git"),
                format!("git@github.com:{owner}/{repo}.git"),
                format!("ssh://git@github.com/{owner}/{repo}.git"),
            ];
            let names: Vec<String> = forms
                .iter()
                .map(|form| parser.parse(form).map(|d| d.local_name).unwrap())
                .collect();
            for name in &names {
                prop_assert_eq!(name, &names[0]);
            }
        }

        /// Property: local names are always a single safe path component
        #[test]
        fn local_name_is_filesystem_safe(
            owner in "[A-Za-z0-9][A-Za-z0-9-]{0,15}",
            repo in "[A-Za-z0-9][A-Za-z0-9._-]{0,15}",
        ) {
            let parser = DescriptorParser::new(Some("tok".to_string()));
            let descriptor = parser.parse(&format!("{owner}/{repo}")).unwrap();
            prop_assert!(is_safe_component(&descriptor.local_name));
        }

        /// Property: the parser never panics on arbitrary text
        #[test]
        fn parse_never_panics(input in ".*") {
            let parser = DescriptorParser::new(Some("tok".to_string()));
            let _ = parser.parse(&input);
        }
    }
}

//! Property-based tests for pressroom
//!
//! Invariants that must hold for all inputs:
//! - Classification is consistent with the access mode
//! - Email normalization is idempotent and case-insensitive
//! - Parsers never panic
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

// ============================================================================
// ROUTING CLASSIFICATION
// ============================================================================

mod routing_tests {
    use super::*;
    use chrono::Utc;
    use pressroom::routing::decide;
    use pressroom::types::{AccessMode, AccessRule};

    fn mode_strategy() -> impl Strategy<Value = AccessMode> {
        prop_oneof![
            Just(AccessMode::Open),
            Just(AccessMode::Password),
            Just(AccessMode::EmailList),
        ]
    }

    fn rule(mode: AccessMode) -> AccessRule {
        AccessRule {
            id: 1,
            content_type: "notes".into(),
            slug: "x".into(),
            access_mode: mode,
            description: None,
            password_hash: None,
            allowed_emails: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    proptest! {
        /// Invariant: is_protected always equals (mode != open)
        #[test]
        fn classification_consistency(mode in mode_strategy(), default in mode_strategy()) {
            let with_rule = decide(Some(&rule(mode)), default);
            prop_assert_eq!(with_rule.is_protected, mode != AccessMode::Open);
            prop_assert_eq!(with_rule.access_mode, mode);
        }

        /// Invariant: without a rule, the decision is exactly the default
        #[test]
        fn missing_rule_follows_default(default in mode_strategy()) {
            let decision = decide(None, default);
            prop_assert_eq!(decision.access_mode, default);
            prop_assert_eq!(decision.is_protected, default != AccessMode::Open);
        }
    }
}

// ============================================================================
// EMAIL NORMALIZATION
// ============================================================================

mod email_tests {
    use super::*;
    use pressroom::types::normalize_email;

    proptest! {
        /// Invariant: normalization never panics
        #[test]
        fn never_panics(s in "\\PC*") {
            let _ = normalize_email(&s);
        }

        /// Invariant: normalization is idempotent
        #[test]
        fn idempotent(s in "\\PC{0,100}") {
            let once = normalize_email(&s);
            prop_assert_eq!(normalize_email(&once), once.clone());
        }

        /// Invariant: case and surrounding whitespace never matter
        #[test]
        fn case_and_whitespace_insensitive(local in "[a-z0-9]{1,16}", domain in "[a-z0-9]{1,16}") {
            let email = format!("{}@{}.com", local, domain);
            let shouty = format!("  {}  ", email.to_uppercase());
            prop_assert_eq!(normalize_email(&shouty), normalize_email(&email));
        }
    }
}

// ============================================================================
// CONTENT PATH PARSING
// ============================================================================

mod path_tests {
    use super::*;
    use pressroom::types::parse_content_path;

    proptest! {
        /// Invariant: parsing never panics on any input
        #[test]
        fn never_panics(s in "\\PC*") {
            let _ = parse_content_path(&s);
        }

        /// Invariant: well-formed content paths round-trip
        #[test]
        fn roundtrip(content_type in "[a-z]{1,12}", slug in "[a-z0-9-]{1,24}") {
            let path = format!("content/{}/{}.md", content_type, slug);
            let parsed = parse_content_path(&path);
            prop_assert_eq!(parsed, Some((content_type, slug)));
        }

        /// Invariant: anything outside the content root is rejected
        #[test]
        fn rejects_foreign_roots(root in "[a-z]{1,10}", rest in "[a-z/]{1,20}") {
            prop_assume!(root != "content");
            let path = format!("{}/{}.md", root, rest);
            prop_assert_eq!(parse_content_path(&path), None);
        }
    }
}

// ============================================================================
// TRANSFORMER
// ============================================================================

mod transform_tests {
    use super::*;
    use pressroom::content::transform;

    proptest! {
        /// Invariant: the transformer never panics on arbitrary bodies
        #[test]
        fn never_panics_on_body(body in "\\PC{0,400}") {
            let _ = transform("content/notes/x.md", &body);
        }

        /// Invariant: read time matches ceil(words / 200), minimum one minute
        #[test]
        fn read_time_formula(words in 1usize..2000) {
            let body = vec!["word"; words].join(" ");
            let t = transform("content/notes/x.md", &body).unwrap();
            let expected = ((words + 199) / 200).max(1);
            prop_assert_eq!(t.read_time, format!("{} min read", expected));
        }

        /// Invariant: excerpts stay bounded
        #[test]
        fn excerpt_bounded(body in "[a-z ]{0,2000}") {
            let t = transform("content/notes/x.md", &body).unwrap();
            // 160 chars + ellipsis at most
            prop_assert!(t.excerpt.chars().count() <= 163);
        }
    }
}

// ============================================================================
// WEBHOOK CHANGE EXTRACTION
// ============================================================================

mod webhook_tests {
    use super::*;
    use pressroom::source::{changed_content_paths, PushCommit, PushEvent};

    fn commit_strategy() -> impl Strategy<Value = PushCommit> {
        let path = prop_oneof![
            "content/notes/[a-z]{1,8}\\.md",
            "content/ideas/[a-z]{1,8}\\.md",
            "[a-z]{1,8}\\.(md|ts|png)",
        ];
        (
            prop::collection::vec(path.clone(), 0..4),
            prop::collection::vec(path.clone(), 0..4),
            prop::collection::vec(path, 0..4),
        )
            .prop_map(|(added, modified, removed)| PushCommit {
                added,
                modified,
                removed,
            })
    }

    proptest! {
        /// Invariant: output is deduplicated and only contains content paths
        #[test]
        fn output_unique_and_filtered(commits in prop::collection::vec(commit_strategy(), 0..5)) {
            let event = PushEvent {
                git_ref: "refs/heads/main".into(),
                commits,
            };
            let paths = changed_content_paths(&event);

            let unique: std::collections::HashSet<_> = paths.iter().collect();
            prop_assert_eq!(unique.len(), paths.len());
            for path in &paths {
                prop_assert!(path.starts_with("content/"));
                prop_assert!(path.ends_with(".md"));
            }
        }
    }
}

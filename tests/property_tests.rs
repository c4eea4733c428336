//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for all inputs,
//! helping catch edge cases that unit tests might miss.

mod common;

use common::{engine, test_job, MockStore};
use object_sync::manifest::parse_line;
use object_sync::{Key, Manifest, OutcomeStatus};
use proptest::prelude::*;
use std::collections::HashMap;

// =============================================================================
// Key Properties
// =============================================================================

proptest! {
    /// A staging file name is always a single, non-special path segment
    #[test]
    fn file_name_is_single_segment(key in "[a-z0-9./_-]{0,40}") {
        let key = Key::from(key.as_str());
        let name = key.file_name();
        prop_assert!(!name.is_empty());
        prop_assert!(!name.contains('/'));
        prop_assert!(name != "." && name != "..");
    }

    /// The file name is the key's last segment whenever that segment is usable
    #[test]
    fn file_name_is_last_segment(dirs in prop::collection::vec("[a-z0-9]{1,8}", 0..5), leaf in "[a-z0-9]{1,12}\\.jpg") {
        let raw = format!("/{}", dirs.iter().chain(std::iter::once(&leaf)).cloned().collect::<Vec<_>>().join("/"));
        let key = Key::from(raw.as_str());
        prop_assert_eq!(key.file_name(), leaf.as_str());
    }
}

// =============================================================================
// Manifest Properties
// =============================================================================

proptest! {
    /// Field 1 is the key, whatever surrounds it
    #[test]
    fn parse_line_extracts_field_one(
        id in "[0-9]{1,6}",
        key in "/[a-zA-Z0-9/._-]{1,60}",
        rest in prop::collection::vec("[a-zA-Z0-9 ]{0,10}", 0..4),
    ) {
        let mut fields = vec![id, key.clone()];
        fields.extend(rest);
        let line = fields.join(";");

        let parsed = parse_line(&line, 1).unwrap().unwrap();
        prop_assert_eq!(parsed.as_str(), key.as_str());
    }

    /// Parsing never panics, and a line either yields a key or a line-numbered error
    #[test]
    fn parse_line_total(line in "\\PC{0,80}", line_no in 1usize..10_000) {
        match parse_line(&line, line_no) {
            Ok(Some(key)) => prop_assert!(!key.as_str().is_empty()),
            Ok(None) => prop_assert!(line.trim().is_empty()),
            Err(e) => {
                let needle = format!("line {}", line_no);
                let message = e.to_string();
                prop_assert!(message.contains(&needle), "{} lacks {}", message, needle);
            }
        }
    }

    /// One key per non-blank line, in file order
    #[test]
    fn manifest_keeps_order(keys in prop::collection::vec("/[a-z0-9/]{1,20}", 0..30), blanks in 0usize..3) {
        let mut raw = String::new();
        for (i, key) in keys.iter().enumerate() {
            raw.push_str(&format!("{};{};0;1\n", i, key));
            for _ in 0..blanks {
                raw.push('\n');
            }
        }
        let manifest = Manifest::parse("m.csv", &raw).unwrap();
        let parsed: Vec<&str> = manifest.keys().iter().map(Key::as_str).collect();
        let expected: Vec<&str> = keys.iter().map(String::as_str).collect();
        prop_assert_eq!(parsed, expected);
    }
}

// =============================================================================
// Engine Coverage
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Exactly one outcome per input key, and the summary adds up
    #[test]
    fn run_covers_every_key(
        present in prop::collection::vec(any::<bool>(), 0..25),
        concurrency in 1usize..6,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let staging = tempfile::tempdir().unwrap();
            let source = MockStore::new();
            let destination = MockStore::new();

            let mut input = Vec::new();
            let mut expected = HashMap::new();
            for (i, present) in present.iter().enumerate() {
                let key = format!("/p/{}.bin", i);
                if *present {
                    source.insert(&key, b"x").await;
                }
                expected.insert(key.clone(), if *present { OutcomeStatus::Succeeded } else { OutcomeStatus::Failed });
                input.push(Key::from(key));
            }

            let report = engine(test_job(staging.path(), concurrency), &source, &destination)
                .run(input)
                .await
                .unwrap();

            assert_eq!(report.outcomes.len(), expected.len());
            assert_eq!(report.summary.total(), report.outcomes.len());
            for outcome in &report.outcomes {
                assert_eq!(Some(&outcome.status), expected.get(outcome.key.as_str()));
            }
        });
    }
}

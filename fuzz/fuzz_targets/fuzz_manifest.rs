//! Fuzz target for manifest parsing.
//!
//! Arbitrary text must parse to keys or a line-numbered error, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use object_sync::manifest::parse_line;
use object_sync::Manifest;

fuzz_target!(|data: &str| {
    match Manifest::parse("fuzz.csv", data) {
        Ok(manifest) => {
            assert!(manifest.len() <= data.lines().count());
            for key in manifest.keys() {
                assert!(!key.as_str().is_empty());
            }
        }
        Err(e) => assert!(e.to_string().contains("line ")),
    }

    for (idx, line) in data.lines().enumerate() {
        let _ = parse_line(line, idx + 1);
    }
});

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Manifest of keys to replicate.
//!
//! One record per line, fields separated by `;`, the key in field 1:
//!
//! ```text
//! 1;/public/data/110/RE0000425/img/45586615.jpeg;48211;1
//! 2;/public/data/110/RE0000425/img/45586616.jpeg;51904;1
//! ```
//!
//! Other fields are ignored. The key field is taken verbatim, surrounding
//! spaces included. Blank lines are skipped. Keys are kept in file
//! order, duplicates included.

use crate::error::{ReplicationError, Result};
use crate::key::Key;
use std::path::Path;
use tracing::debug;

/// Field separator.
pub const FIELD_SEPARATOR: char = ';';

/// Index of the key field.
pub const KEY_FIELD: usize = 1;

/// A parsed manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    id: String,
    keys: Vec<Key>,
}

impl Manifest {
    /// Read and parse the manifest at `path`. Its base name becomes the id.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ReplicationError::Config(format!("manifest path has no file name: {}", path.display())))?;

        let manifest = Self::parse(id, &raw)?;
        debug!(manifest = %manifest.id, keys = manifest.len(), "Manifest loaded");
        Ok(manifest)
    }

    /// Parse manifest text.
    pub fn parse(id: impl Into<String>, raw: &str) -> Result<Self> {
        let mut keys = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if let Some(key) = parse_line(line, idx + 1)? {
                keys.push(key);
            }
        }
        Ok(Self { id: id.into(), keys })
    }

    /// Identifier recorded in the checkpoint (the file base name).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn into_keys(self) -> Vec<Key> {
        self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Key of one manifest line, `None` for a blank line.
///
/// `line_no` is 1-based and only used in the error.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<Key>> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return Ok(None);
    }

    // The key is kept byte for byte; only a blank field is rejected.
    match line.split(FIELD_SEPARATOR).nth(KEY_FIELD) {
        Some(key) if !key.trim().is_empty() => Ok(Some(Key::from(key))),
        Some(_) => Err(ReplicationError::Manifest {
            line: line_no,
            message: "empty key field".to_string(),
        }),
        None => Err(ReplicationError::Manifest {
            line: line_no,
            message: format!("missing key field (expected at least {} fields)", KEY_FIELD + 1),
        }),
    }
}

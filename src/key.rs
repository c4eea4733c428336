// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Object keys.

use std::fmt;
use std::sync::Arc;

/// File name used when a key has no usable final segment (`"/"`, `"a/.."`).
const FALLBACK_FILE_NAME: &str = "object";

/// Identifier of an object, identical in the source and destination stores.
///
/// Cloning is cheap (shared string). The key is never rewritten: the
/// destination object is always written under exactly the source key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Arc<str>);

impl Key {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Local file name for staging: the key's final `/` segment.
    ///
    /// Never contains a path separator and is never `.`/`..`, so it can be
    /// joined onto a staging directory safely.
    pub fn file_name(&self) -> &str {
        match self.0.rsplit('/').next() {
            Some(segment) if !segment.is_empty() && segment != "." && segment != ".." => segment,
            _ => FALLBACK_FILE_NAME,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for object replication.
//!
//! Errors fall into two layers:
//!
//! - [`StoreError`]: what an [`ObjectStore`](crate::store::ObjectStore)
//!   implementation reports for a single call.
//! - [`ReplicationError`]: what the engine, staging area, checkpoint store
//!   and manifest loader report to their callers.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Connection` | Yes | Store unreachable; retried by the connect policy, then fatal to a run |
//! | `TransientObject` | Yes | Read/write failed, store may recover |
//! | `PermanentObject` | No | Retry policy exhausted for a read/write |
//! | `AbsentObject` | No | Source object confirmed missing |
//! | `EmptyObject` | Yes | Source returned a zero-length stream |
//! | `Staging` | No | Local temp storage could not be created/removed |
//! | `Checkpoint` | No | Checkpoint file could not be read/written |
//! | `Manifest` | No | Manifest line is malformed |
//! | `Config` | No | Configuration invalid |
//! | `InvalidState` | No | Engine used out of order |
//! | `Io` | Yes | Local filesystem error |
//!
//! # Retry Behavior
//!
//! [`ReplicationError::is_retryable()`] drives
//! [`RetryPolicy::execute`](crate::resilience::RetryPolicy::execute): a
//! non-retryable error ends the attempt loop immediately, so a confirmed
//! absent object does not burn the fetch budget.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Result type for object store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Error reported by an object store for a single call.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store explicitly reports that the key does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The store is temporarily unable to serve the request
    /// (timeout, tracker busy, storage node down).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Local or remote I/O failure while streaming object bytes.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else the backend could not classify.
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// A confirmed absence is the only store error retries cannot fix.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }
}

/// Errors that can occur during replication.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// A store handle could not be established or probed.
    ///
    /// Fatal to a run: no key can be processed without both stores.
    #[error("Connection error ({endpoint}): {message}")]
    Connection { endpoint: String, message: String },

    /// A read or write failed in a way the store may recover from.
    #[error("Transient object error ({operation} {key}): {source}")]
    TransientObject {
        operation: &'static str,
        key: String,
        #[source]
        source: StoreError,
    },

    /// A read or write still failed after the retry policy was exhausted.
    #[error("{operation} failed for {key} after {attempts} attempts: {last_error}")]
    PermanentObject {
        operation: &'static str,
        key: String,
        attempts: u32,
        last_error: String,
    },

    /// The source object does not exist.
    #[error("Object absent at source: {0}")]
    AbsentObject(String),

    /// The source returned an empty stream for the object.
    #[error("Object {0} returned no data")]
    EmptyObject(String),

    /// Local staging storage could not be created or removed.
    #[error("Staging error ({path}): {message}")]
    Staging { path: PathBuf, message: String },

    /// Checkpoint file could not be read or written.
    #[error("Checkpoint error ({path}): {message}")]
    Checkpoint { path: PathBuf, message: String },

    /// Manifest line could not be parsed.
    #[error("Manifest error at line {line}: {message}")]
    Manifest { line: usize, message: String },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Engine state machine violation.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Local filesystem error outside staging/checkpoint handling.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReplicationError {
    /// Wrap a store error raised by `operation` on `key`.
    ///
    /// `NotFound` from a read is promoted to [`AbsentObject`](Self::AbsentObject)
    /// so it is not retried.
    pub fn object(operation: &'static str, key: impl Into<String>, source: StoreError) -> Self {
        let key = key.into();
        match source {
            StoreError::NotFound(_) if operation == "fetch" => Self::AbsentObject(key),
            source => Self::TransientObject {
                operation,
                key,
                source,
            },
        }
    }

    /// Build a staging error for `path`.
    pub fn staging(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Staging {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Build a checkpoint error for `path`.
    pub fn checkpoint(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Checkpoint {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientObject { source, .. } => source.is_retryable(),
            Self::EmptyObject(_) => true, // Partial client failure looks like this
            Self::Connection { .. } => true, // Retried inside the connect policy only
            Self::PermanentObject { .. } => false,
            Self::AbsentObject(_) => false,
            Self::Staging { .. } => false,
            Self::Checkpoint { .. } => false,
            Self::Manifest { .. } => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Io(_) => true, // staging disk, not a store
        }
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for a replication run.
//!
//! A [`SyncJob`] is built once at startup (from CLI flags, a JSON file, or
//! programmatically) and shared read-only by every task of the run.
//!
//! # Quick Start
//!
//! ```rust
//! use object_sync::config::{SyncJob, StoreEndpoint};
//!
//! let job = SyncJob {
//!     domain: "media".into(),
//!     source: StoreEndpoint::new(["localhost:6001"]),
//!     destination: StoreEndpoint::new(["10.3.16.102:7001"]),
//!     concurrency: 8,
//!     ..Default::default()
//! };
//! assert!(job.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! SyncJob
//! ├── domain: String                 # namespace in both stores
//! ├── source / destination: StoreEndpoint
//! ├── concurrency: usize             # worker count (default 1)
//! ├── verify_existing: bool          # skip keys already at destination
//! ├── retry: RetryPolicies           # connect / exists / fetch / upload
//! ├── staging: StagingConfig         # where fetched bytes are parked
//! ├── rate_limit: RateLimitSettings  # optional dispatch throttle
//! └── checkpoint: CheckpointConfig   # last fully processed manifest
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "domain": "media",
//!   "source": { "addresses": ["localhost:6001"] },
//!   "destination": { "addresses": ["10.3.16.102:7001"] },
//!   "concurrency": 10,
//!   "verify_existing": true,
//!   "retry": { "upload": { "max_attempts": 10, "delay": "5s" } },
//!   "staging": { "base_dir": "/dev/shm" }
//! }
//! ```

use crate::error::{ReplicationError, Result};
use crate::resilience::{RateLimitConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// SyncJob: the whole run
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration bundle for one replication run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    /// Domain / namespace the keys live in, on both sides.
    pub domain: String,

    /// Where objects are read from.
    pub source: StoreEndpoint,

    /// Where objects are written to.
    pub destination: StoreEndpoint,

    /// Number of parallel workers. Defaults to 1.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Check the destination first and skip keys it already holds.
    #[serde(default)]
    pub verify_existing: bool,

    /// Retry policy per operation kind.
    #[serde(default)]
    pub retry: RetryPolicies,

    /// Staging directory settings.
    #[serde(default)]
    pub staging: StagingConfig,

    /// Optional throttle on how fast keys are dispatched.
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// Checkpoint file settings (used by the caller, not the engine).
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

fn default_concurrency() -> usize {
    1
}

impl Default for SyncJob {
    fn default() -> Self {
        Self {
            domain: "default".to_string(),
            source: StoreEndpoint::new(["localhost:6001"]),
            destination: StoreEndpoint::default(),
            concurrency: 1,
            verify_existing: false,
            retry: RetryPolicies::default(),
            staging: StagingConfig::default(),
            rate_limit: RateLimitSettings::default(),
            checkpoint: CheckpointConfig::default(),
        }
    }
}

impl SyncJob {
    /// Minimal job for tests: millisecond retry delays, no throttle.
    pub fn for_testing(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            source: StoreEndpoint::new(["source"]),
            destination: StoreEndpoint::new(["destination"]),
            retry: RetryPolicies::testing(),
            ..Default::default()
        }
    }

    /// Load a job from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ReplicationError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ReplicationError::Config(format!("invalid job file {}: {}", path.display(), e))
        })
    }

    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(ReplicationError::Config("domain must not be empty".into()));
        }
        if self.source.addresses.is_empty() {
            return Err(ReplicationError::Config("source endpoint has no addresses".into()));
        }
        if self.destination.addresses.is_empty() {
            return Err(ReplicationError::Config(
                "destination endpoint has no addresses".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ReplicationError::Config("concurrency must be at least 1".into()));
        }
        self.retry.validate()?;
        if self.rate_limit.enabled && self.rate_limit.per_sec == 0 {
            return Err(ReplicationError::Config(
                "rate_limit.per_sec must be positive when enabled".into(),
            ));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// StoreEndpoint
// ═══════════════════════════════════════════════════════════════════════════════

/// Addresses of one store cluster (trackers, gateways, or a root directory).
///
/// Interpretation of each address is up to the
/// [`StoreConnector`](crate::store::StoreConnector).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEndpoint {
    pub addresses: Vec<String>,
}

impl StoreEndpoint {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for StoreEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addresses.join(","))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RetryPolicies
// ═══════════════════════════════════════════════════════════════════════════════

/// One [`RetryPolicy`] per operation kind.
///
/// Cleanup has no policy: it is never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicies {
    /// Establishing and probing a store connection.
    #[serde(default = "default_connect_policy")]
    pub connect: RetryPolicy,

    /// Destination existence check (only when `verify_existing`).
    #[serde(default = "default_exists_policy")]
    pub exists: RetryPolicy,

    /// Reading the source object into staging.
    #[serde(default = "default_fetch_policy")]
    pub fetch: RetryPolicy,

    /// Writing the staged file to the destination.
    #[serde(default = "default_upload_policy")]
    pub upload: RetryPolicy,
}

fn default_connect_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_secs(2))
}

fn default_exists_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_secs(1))
}

fn default_fetch_policy() -> RetryPolicy {
    RetryPolicy::new(5, Duration::from_secs(1))
}

fn default_upload_policy() -> RetryPolicy {
    RetryPolicy::new(7, Duration::from_secs(3))
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            connect: default_connect_policy(),
            exists: default_exists_policy(),
            fetch: default_fetch_policy(),
            upload: default_upload_policy(),
        }
    }
}

impl RetryPolicies {
    /// Same attempt counts as production, 1ms delays.
    pub fn testing() -> Self {
        let fast = Duration::from_millis(1);
        Self {
            connect: RetryPolicy::new(3, fast),
            exists: RetryPolicy::new(3, fast),
            fetch: RetryPolicy::new(5, fast),
            upload: RetryPolicy::new(7, fast),
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, policy) in [
            ("connect", &self.connect),
            ("exists", &self.exists),
            ("fetch", &self.fetch),
            ("upload", &self.upload),
        ] {
            if policy.max_attempts == 0 {
                return Err(ReplicationError::Config(format!(
                    "retry.{}.max_attempts must be at least 1",
                    name
                )));
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// StagingConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Where fetched objects are parked between fetch and upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Parent directory for per-key staging directories.
    /// `None` uses the system temp directory.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    /// Name prefix of each per-key directory.
    #[serde(default = "default_staging_prefix")]
    pub prefix: String,
}

fn default_staging_prefix() -> String {
    "object-sync-".to_string()
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            prefix: default_staging_prefix(),
        }
    }
}

impl StagingConfig {
    /// Staging under a specific directory (tmpfs such as `/dev/shm` is ideal).
    pub fn in_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
            ..Default::default()
        }
    }

    /// Resolved parent directory.
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RateLimitSettings
// ═══════════════════════════════════════════════════════════════════════════════

/// Dispatch throttle, so a large catch-up does not saturate the source cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Keys dispatched per second (sustained).
    #[serde(default = "default_rate_limit_per_sec")]
    pub per_sec: u32,

    /// Keys that may be dispatched back-to-back before throttling kicks in.
    #[serde(default = "default_rate_limit_burst")]
    pub burst: u32,
}

fn default_rate_limit_per_sec() -> u32 {
    100
}

fn default_rate_limit_burst() -> u32 {
    10
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            per_sec: default_rate_limit_per_sec(),
            burst: default_rate_limit_burst(),
        }
    }
}

impl RateLimitSettings {
    /// Limiter configuration, or `None` when throttling is off.
    pub fn rate_limit_config(&self) -> Option<RateLimitConfig> {
        if self.enabled {
            Some(RateLimitConfig {
                burst_size: self.burst,
                refill_rate: self.per_sec,
            })
        } else {
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CheckpointConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Checkpoint file location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("base_backup"),
        }
    }
}

/// `serde(with)` helper: durations as humantime strings (`"1s"`, `"250ms"`).
pub(crate) mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_defaults() {
        let retry = RetryPolicies::default();
        assert_eq!(retry.connect, RetryPolicy::new(3, Duration::from_secs(2)));
        assert_eq!(retry.fetch, RetryPolicy::new(5, Duration::from_secs(1)));
        assert_eq!(retry.upload, RetryPolicy::new(7, Duration::from_secs(3)));
        assert_eq!(retry.exists, RetryPolicy::new(3, Duration::from_secs(1)));
    }

    #[test]
    fn test_sync_job_default() {
        let job = SyncJob::default();
        assert_eq!(job.concurrency, 1);
        assert!(!job.verify_existing);
        assert!(!job.rate_limit.enabled);
        assert_eq!(job.checkpoint.path, PathBuf::from("base_backup"));
    }

    #[test]
    fn test_default_job_fails_validation_without_destination() {
        let err = SyncJob::default().validate().unwrap_err();
        assert!(err.to_string().contains("destination"));
    }

    #[test]
    fn test_for_testing_is_valid() {
        let job = SyncJob::for_testing("media");
        assert!(job.validate().is_ok());
        assert_eq!(job.retry.fetch.delay, Duration::from_millis(1));
        assert_eq!(job.retry.fetch.max_attempts, 5);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let job = SyncJob {
            concurrency: 0,
            ..SyncJob::for_testing("media")
        };
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut job = SyncJob::for_testing("media");
        job.retry.upload.max_attempts = 0;
        let err = job.validate().unwrap_err();
        assert!(err.to_string().contains("retry.upload"));
    }

    #[test]
    fn test_validate_rejects_empty_domain() {
        let job = SyncJob::for_testing("  ");
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_json_partial_with_defaults() {
        let json = r#"{
            "domain": "media",
            "source": { "addresses": ["localhost:6001"] },
            "destination": { "addresses": ["10.3.16.102:7001"] },
            "concurrency": 10,
            "verify_existing": true,
            "retry": { "upload": { "max_attempts": 10, "delay": "5s" } },
            "staging": { "base_dir": "/dev/shm" }
        }"#;
        let job: SyncJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.concurrency, 10);
        assert!(job.verify_existing);
        assert_eq!(job.retry.upload, RetryPolicy::new(10, Duration::from_secs(5)));
        // Unspecified policies keep their defaults
        assert_eq!(job.retry.fetch, RetryPolicy::new(5, Duration::from_secs(1)));
        assert_eq!(job.staging.base_dir(), PathBuf::from("/dev/shm"));
        assert_eq!(job.staging.prefix, "object-sync-");
    }

    #[test]
    fn test_json_roundtrip_durations_as_strings() {
        let job = SyncJob::for_testing("media");
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"1ms\""));
        let parsed: SyncJob = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.retry, job.retry);
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let json = r#"{ "max_attempts": 3, "delay": "soon" }"#;
        assert!(serde_json::from_str::<RetryPolicy>(json).is_err());
    }

    #[test]
    fn test_rate_limit_config() {
        let mut settings = RateLimitSettings::default();
        assert!(settings.rate_limit_config().is_none());

        settings.enabled = true;
        settings.per_sec = 50;
        settings.burst = 5;
        let cfg = settings.rate_limit_config().unwrap();
        assert_eq!(cfg.refill_rate, 50);
        assert_eq!(cfg.burst_size, 5);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(
            &path,
            r#"{"domain":"d","source":{"addresses":["a"]},"destination":{"addresses":["b"]}}"#,
        )
        .unwrap();
        let job = SyncJob::from_json_file(&path).unwrap();
        assert_eq!(job.domain, "d");
        assert_eq!(job.concurrency, 1);

        let missing = SyncJob::from_json_file(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(ReplicationError::Config(_))));
    }

    #[test]
    fn test_endpoint_display() {
        let ep = StoreEndpoint::new(["t1:7001", "t2:7001"]);
        assert_eq!(ep.to_string(), "t1:7001,t2:7001");
    }

    #[test]
    fn test_staging_default_base_is_temp_dir() {
        assert_eq!(StagingConfig::default().base_dir(), std::env::temp_dir());
    }
}

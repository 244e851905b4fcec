//! Core data types used throughout the bitrot library
//!
//! This module contains fundamental data structures that are shared across
//! the state store and the scrubber.
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Observed state**: `FileRecord`, `ContentDigest` - what was recorded for a file
//! - **Results**: `MismatchReport`, `ScanSummary` - what a scan found
//! - **Configuration**: `ScrubConfig` - how a scan is performed
//! - **Progress**: `ProgressInfo`, `ProgressCallback` - feedback during a scan

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use crate::utils::escape_path;
use std::path::PathBuf;
use std::sync::Arc;

/// SHA-256 digest of a file's full content
///
/// Stored as 32 raw bytes in memory and as lowercase hex in persisted state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex string
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.short())
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentDigest::from_hex(&s).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid SHA-256 digest: {:?}", s))
        })
    }
}

/// What was recorded for a single file
///
/// Two records describe the same on-disk state when all four fields match.
/// `size`, `mode` and `modified` together form the metadata the scrubber uses
/// to tell a legitimate edit from silent corruption.
///
/// # Examples
///
/// ```rust
/// # use bitrot::types::{ContentDigest, FileRecord};
/// # use chrono::Utc;
/// let record = FileRecord {
///     size: 5,
///     mode: 0o100644,
///     modified: Utc::now(),
///     digest: ContentDigest::from_bytes([0u8; 32]),
/// };
/// assert!(record.same_metadata(&record));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    /// File size in bytes
    pub size: u64,
    /// Permission and file type bits (full `st_mode` on Unix)
    pub mode: u32,
    /// Last modified timestamp
    pub modified: DateTime<Utc>,
    /// SHA-256 of the file content
    pub digest: ContentDigest,
}

impl FileRecord {
    /// Check whether size, mode and modification time all match
    pub fn same_metadata(&self, other: &FileRecord) -> bool {
        self.size == other.size && self.mode == other.mode && self.modified == other.modified
    }
}

/// A file whose content changed while its metadata did not
///
/// Displays as a single report line. The path is escaped with
/// [`escape_path`] so a newline in a file name cannot split the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MismatchReport {
    /// Absolute path of the file
    #[serde(with = "crate::utils::serde_path")]
    pub path: PathBuf,
    /// Digest recorded in the state
    pub expected: ContentDigest,
    /// Digest computed during this scan
    pub actual: ContentDigest,
}

impl fmt::Display for MismatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Digest Mismatch] {} ({} -> {})",
            escape_path(&self.path),
            self.expected,
            self.actual
        )
    }
}

/// Counters collected during a single scan
///
/// Every regular file visited lands in exactly one of `new`, `updated`,
/// `unchanged` or `mismatched`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Regular files visited and digested
    pub files_seen: usize,
    /// Files recorded for the first time
    pub new: usize,
    /// Files whose metadata changed; record replaced
    pub updated: usize,
    /// Files with matching metadata and digest
    pub unchanged: usize,
    /// Files reported as corrupted
    pub mismatched: usize,
    /// Entries skipped because they could not be read during the walk
    pub skipped: usize,
    /// Entries skipped by exclusion patterns
    pub excluded: usize,
    /// Recorded entries that were not seen during this scan
    pub stale: usize,
    /// Total bytes fed through the digest
    pub bytes_hashed: u64,
    /// Wall-clock duration of the scan in milliseconds
    pub duration_ms: u64,
}

impl ScanSummary {
    /// Check if any corruption was reported
    pub fn has_mismatches(&self) -> bool {
        self.mismatched > 0
    }

    /// Check if the scan changed the state
    pub fn state_changed(&self) -> bool {
        self.new > 0 || self.updated > 0
    }
}

/// Configuration for a scrub run
///
/// Passed explicitly to the [`Scrubber`](crate::scrubber::Scrubber); there is
/// no process-wide configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrubConfig {
    /// Root directory being scrubbed (canonical once resolved)
    pub root_path: PathBuf,
    /// Glob patterns, relative to the root, excluded from the scan
    pub exclude_patterns: Vec<String>,
    /// Explicit state directory; `None` uses `BITROT_STATE_DIR` or the
    /// per-user default
    pub state_dir: Option<PathBuf>,
}

/// Progress callback for long-running scans
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Information passed to progress callbacks
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<PathBuf>,
    /// Items processed so far
    pub processed: usize,
    /// Bytes processed so far
    pub bytes_processed: u64,
}

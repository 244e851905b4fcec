//! Directory state and its persisted form
//!
//! A [`DirectoryState`] maps every file ever observed under one scan root to
//! the [`FileRecord`] last accepted for it. It is loaded once at start, mutated
//! by a single scrub pass, and written back once at the end.
//!
//! ## Persisted format
//!
//! The state is encoded as a JSON document wrapped in an LZ4 envelope (see
//! [`crate::compression`]):
//!
//! ```text
//! {
//!   "format_version": 1,
//!   "bitrot_version": "0.1.0",
//!   "updated_at": "2026-10-17T08:12:44.120Z",
//!   "root": "/srv/archive",
//!   "entries": [
//!     {
//!       "path": "/srv/archive/a.txt",
//!       "size": 5,
//!       "mode": 33188,
//!       "modified": "2014-12-01T10:00:00.123456789Z",
//!       "digest": "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
//!     },
//!     {
//!       "path": { "hex": "2f7372762f617263686976652f70686f746fff2e6a7067" },
//!       ...
//!     }
//!   ]
//! }
//! ```
//!
//! Paths that are not valid UTF-8 are stored as their raw bytes in hex, so
//! every file the walk can reach has a record. Entries are kept in a
//! `BTreeMap` so the encoded document is stable between runs that observe the
//! same tree.
//!
//! Decoding is all-or-nothing: any failure in the envelope, the JSON, or the
//! version check yields [`BitrotError::CorruptState`] and no state at all.

use crate::compression::CompressionEngine;
use crate::error::{BitrotError, Result};
use crate::types::{ContentDigest, FileRecord};
use crate::utils::serde_path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Current version of the persisted document
pub const FORMAT_VERSION: u32 = 1;

/// Recorded state of every file under one root
///
/// # Examples
///
/// ```rust
/// use bitrot::state::DirectoryState;
///
/// let state = DirectoryState::new("/srv/archive");
/// let bytes = state.serialize()?;
/// let restored = DirectoryState::deserialize(&bytes)?;
/// assert_eq!(restored.root(), state.root());
/// assert!(restored.is_empty());
/// # Ok::<(), bitrot::BitrotError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct DirectoryState {
    root: PathBuf,
    entries: BTreeMap<PathBuf, FileRecord>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct StateDocumentRef<'a> {
    format_version: u32,
    bitrot_version: &'a str,
    updated_at: DateTime<Utc>,
    #[serde(with = "serde_path")]
    root: &'a Path,
    entries: Vec<EntryRef<'a>>,
}

#[derive(Serialize)]
struct EntryRef<'a> {
    #[serde(with = "serde_path")]
    path: &'a Path,
    size: u64,
    mode: u32,
    modified: DateTime<Utc>,
    digest: ContentDigest,
}

#[derive(Deserialize)]
struct StateDocument {
    format_version: u32,
    #[allow(dead_code)]
    bitrot_version: String,
    updated_at: DateTime<Utc>,
    #[serde(with = "serde_path")]
    root: PathBuf,
    entries: Vec<Entry>,
}

#[derive(Deserialize)]
struct Entry {
    #[serde(with = "serde_path")]
    path: PathBuf,
    size: u64,
    mode: u32,
    modified: DateTime<Utc>,
    digest: ContentDigest,
}

impl<'a> From<(&'a PathBuf, &'a FileRecord)> for EntryRef<'a> {
    fn from((path, record): (&'a PathBuf, &'a FileRecord)) -> Self {
        Self {
            path,
            size: record.size,
            mode: record.mode,
            modified: record.modified,
            digest: record.digest,
        }
    }
}

impl From<Entry> for (PathBuf, FileRecord) {
    fn from(entry: Entry) -> Self {
        let record = FileRecord {
            size: entry.size,
            mode: entry.mode,
            modified: entry.modified,
            digest: entry.digest,
        };
        (entry.path, record)
    }
}

impl DirectoryState {
    /// Create an empty state for `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: BTreeMap::new(),
            updated_at: None,
        }
    }

    /// Root directory this state describes
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// When this state was last serialized, if it was ever loaded from disk
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Look up the record for `path`
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&FileRecord> {
        self.entries.get(path.as_ref())
    }

    /// Check whether `path` has a record
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.entries.contains_key(path.as_ref())
    }

    /// Insert or replace the record for `path`
    ///
    /// Returns the previous record, if any.
    pub fn insert(&mut self, path: impl Into<PathBuf>, record: FileRecord) -> Option<FileRecord> {
        self.entries.insert(path.into(), record)
    }

    /// Number of recorded files
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether no file has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all records in path order
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &FileRecord)> {
        self.entries.iter()
    }

    /// Encode the whole state as a compressed document
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let document = StateDocumentRef {
            format_version: FORMAT_VERSION,
            bitrot_version: env!("CARGO_PKG_VERSION"),
            updated_at: Utc::now(),
            root: &self.root,
            entries: self.entries.iter().map(EntryRef::from).collect(),
        };

        let json = serde_json::to_vec(&document)?;
        let mut engine = CompressionEngine::new();
        let envelope = engine.compress(&json);

        debug!(
            "Serialized state for {:?}: {} entries, {} bytes",
            self.root,
            self.entries.len(),
            envelope.len()
        );
        Ok(envelope)
    }

    /// Decode a state produced by [`DirectoryState::serialize`]
    ///
    /// # Errors
    ///
    /// [`BitrotError::CorruptState`] if the envelope, the document, or its
    /// version cannot be understood.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut engine = CompressionEngine::new();
        let json = engine
            .decompress(bytes)
            .map_err(|e| BitrotError::corrupt_state(e.to_string()))?;

        let document: StateDocument = serde_json::from_slice(&json)
            .map_err(|e| BitrotError::corrupt_state(format!("Invalid state document: {}", e)))?;

        if document.format_version != FORMAT_VERSION {
            return Err(BitrotError::corrupt_state(format!(
                "Unsupported state format version {} (expected {})",
                document.format_version, FORMAT_VERSION
            )));
        }

        let document_len = document.entries.len();
        trace!(
            "Deserialized state for {:?} with {} entries",
            document.root,
            document_len
        );

        let entries: BTreeMap<PathBuf, FileRecord> =
            document.entries.into_iter().map(Into::into).collect();
        if entries.len() != document_len {
            return Err(BitrotError::corrupt_state("Duplicate paths in state document"));
        }

        Ok(Self {
            root: document.root,
            entries,
            updated_at: Some(document.updated_at),
        })
    }

    /// Write the encoded state to `writer`
    pub fn save<W: Write>(&self, mut writer: W) -> Result<()> {
        let bytes = self.serialize()?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Read and decode a state from `reader`
    ///
    /// An I/O failure while reading is reported as [`BitrotError::Io`]; bytes
    /// that were read but cannot be decoded are [`BitrotError::CorruptState`].
    pub fn load<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::deserialize(&bytes)
    }
}

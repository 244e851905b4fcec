//! Tree walking and corruption detection
//!
//! The [`Scrubber`] walks a directory tree, digests every regular file, and
//! reconciles what it sees with a [`DirectoryState`]:
//!
//! | Recorded? | Metadata (size, mode, mtime) | Digest   | Action                     |
//! |-----------|------------------------------|----------|----------------------------|
//! | no        | -                            | -        | insert record              |
//! | yes       | differs                      | -        | replace record             |
//! | yes       | identical                    | equal    | nothing                    |
//! | yes       | identical                    | differs  | report, keep old record    |
//!
//! A changed digest under unchanged metadata is the signature of bitrot: the
//! content changed without anything writing to the file. Any metadata change
//! is taken as a legitimate edit, so corruption that also disturbs the
//! metadata (or an edit that carefully restores size and mtime) goes
//! unnoticed. The filesystem clock is trusted.
//!
//! A reported file keeps its old record, so it is reported again on every run
//! until someone restores the content or deliberately touches the file.
//!
//! ## Walk errors
//!
//! Entries that cannot be listed or stat'd are skipped and the walk continues;
//! each one is logged at debug level and the total is logged as a warning at
//! the end. Reading a regular file's content, on the other hand, must succeed:
//! a failure there aborts the pass with [`BitrotError::FileRead`], and the
//! caller is expected to discard the partially updated state.
//! [`Scrubber::run`] does exactly that.
//!
//! Every regular file gets a record, whatever bytes its name is made of.
//!
//! ## Stale entries
//!
//! Records for files that no longer exist are kept. They are counted in
//! [`ScanSummary::stale`] but never removed or reported.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bitrot::{DirectoryState, Scrubber};
//! use bitrot::types::MismatchReport;
//!
//! # fn main() -> bitrot::Result<()> {
//! let scrubber = Scrubber::new("/srv/archive")
//!     .with_exclude_patterns(vec!["*.tmp".to_string()])?;
//! let mut state = DirectoryState::new(scrubber.root());
//!
//! let mut reports: Vec<MismatchReport> = Vec::new();
//! let summary = scrubber.compare(&mut state, &mut reports)?;
//! println!("{} files, {} corrupted", summary.files_seen, reports.len());
//! # Ok(())
//! # }
//! ```

use crate::error::{BitrotError, Result};
use crate::state::DirectoryState;
use crate::storage::StateDirectory;
use crate::types::{
    ContentDigest, FileRecord, MismatchReport, ProgressCallback, ProgressInfo, ScanSummary,
    ScrubConfig,
};
use crate::utils::{self, FileMetadata};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::cell::Cell;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, trace, warn};
use walkdir::{DirEntry, WalkDir};

/// Receiver for mismatch reports
///
/// The scrubber hands every detected corruption to a sink as soon as it is
/// found. A sink error aborts the scan.
pub trait ReportSink {
    /// Deliver one report
    fn report(&mut self, report: &MismatchReport) -> Result<()>;
}

impl ReportSink for Vec<MismatchReport> {
    fn report(&mut self, report: &MismatchReport) -> Result<()> {
        self.push(report.clone());
        Ok(())
    }
}

/// Sink writing one line per report to any writer (stdout in the CLI)
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for WriterSink<W> {
    fn report(&mut self, report: &MismatchReport) -> Result<()> {
        writeln!(self.writer, "{}", report)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// How an observed file relates to its record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// No record yet
    New,
    /// Metadata changed; treated as a legitimate edit
    Updated,
    /// Metadata and digest both match
    Unchanged,
    /// Metadata matches but content does not
    Mismatch {
        /// Digest on record
        expected: ContentDigest,
    },
}

/// Decide what to do with a freshly observed file
pub fn classify(stored: Option<&FileRecord>, observed: &FileRecord) -> Classification {
    match stored {
        None => Classification::New,
        Some(stored) if !stored.same_metadata(observed) => Classification::Updated,
        Some(stored) if stored.digest == observed.digest => Classification::Unchanged,
        Some(stored) => Classification::Mismatch {
            expected: stored.digest,
        },
    }
}

/// Walks a tree and reconciles it with a [`DirectoryState`]
pub struct Scrubber {
    /// Root directory to scan
    root_path: PathBuf,
    /// Exclusion patterns as given
    exclude_patterns: Vec<String>,
    /// Compiled exclusion patterns
    exclude_set: GlobSet,
    /// Called after every regular file
    progress_callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for Scrubber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scrubber")
            .field("root_path", &self.root_path)
            .field("exclude_patterns", &self.exclude_patterns)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl Scrubber {
    /// Create a scrubber for `root_path` with no exclusions
    ///
    /// The root is used as given; callers that persist state should pass a
    /// path from [`utils::resolve_root`](crate::utils::resolve_root) so the
    /// recorded paths are canonical.
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            exclude_patterns: Vec::new(),
            exclude_set: GlobSet::empty(),
            progress_callback: None,
        }
    }

    /// Create a scrubber from a [`ScrubConfig`]
    pub fn from_config(config: &ScrubConfig) -> Result<Self> {
        Self::new(&config.root_path).with_exclude_patterns(config.exclude_patterns.clone())
    }

    /// Set exclusion patterns
    ///
    /// Patterns are globs matched against the path relative to the root.
    /// A matching directory is not descended into.
    ///
    /// # Errors
    ///
    /// [`BitrotError::InvalidPattern`] if a pattern does not compile.
    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| BitrotError::InvalidPattern(format!("{}: {}", pattern, e)))?;
            builder.add(glob);
        }
        self.exclude_set = builder
            .build()
            .map_err(|e| BitrotError::InvalidPattern(e.to_string()))?;
        self.exclude_patterns = patterns;
        Ok(self)
    }

    /// Set a progress callback invoked after every regular file
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Root directory being scanned
    pub fn root(&self) -> &Path {
        &self.root_path
    }

    /// Exclusion patterns in effect
    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude_patterns
    }

    /// One complete run against the state recorded in `store`
    ///
    /// Loads the state for the root, compares, and saves the result unless
    /// `dry_run` is set. If the comparison fails nothing is written, so the
    /// previously saved state stays authoritative.
    ///
    /// # Errors
    ///
    /// Everything [`StateDirectory::load_state`], [`Scrubber::compare`] and
    /// [`StateDirectory::save_state`] can return.
    pub fn run<S>(&self, store: &StateDirectory, sink: &mut S, dry_run: bool) -> Result<ScanSummary>
    where
        S: ReportSink + ?Sized,
    {
        let mut state = store.load_state(&self.root_path)?;
        let summary = self.compare(&mut state, sink)?;

        if dry_run {
            info!("Dry run, state for {:?} not saved", self.root_path);
        } else {
            store.save_state(&state)?;
        }
        Ok(summary)
    }

    /// Walk the tree once, updating `state` and reporting corruption to `sink`
    ///
    /// # Errors
    ///
    /// - [`BitrotError::FileRead`] if a regular file cannot be read in full;
    ///   `state` may already hold updates for earlier files and should not be
    ///   persisted
    /// - any error returned by `sink`
    pub fn compare<S>(&self, state: &mut DirectoryState, sink: &mut S) -> Result<ScanSummary>
    where
        S: ReportSink + ?Sized,
    {
        let start = Instant::now();
        let mut summary = ScanSummary::default();
        let mut seen: HashSet<PathBuf> = HashSet::with_capacity(state.len());
        let excluded = Cell::new(0usize);

        debug!("Scrubbing {:?} against {} recorded entries", self.root_path, state.len());

        let walker = WalkDir::new(&self.root_path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                if self.is_excluded(entry) {
                    trace!("Excluded {:?}", entry.path());
                    excluded.set(excluded.get() + 1);
                    false
                } else {
                    true
                }
            });

        for entry_result in walker {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    summary.skipped += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let metadata = match entry
                .metadata()
                .map_err(std::io::Error::from)
                .and_then(|m| FileMetadata::from_fs(&m))
            {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!("Skipping {:?}: unable to stat: {}", entry.path(), e);
                    summary.skipped += 1;
                    continue;
                }
            };

            let path = entry.into_path();
            let (digest, bytes) = utils::hash_file_content(&path)?;
            summary.files_seen += 1;
            summary.bytes_hashed += bytes;

            let observed = FileRecord {
                size: metadata.size,
                mode: metadata.mode,
                modified: metadata.modified,
                digest,
            };

            match classify(state.get(&path), &observed) {
                Classification::New => {
                    debug!("[New] {} ({})", path.display(), digest.short());
                    summary.new += 1;
                    state.insert(path.clone(), observed);
                }
                Classification::Updated => {
                    debug!("[Metadata changes] {} ({})", path.display(), digest.short());
                    summary.updated += 1;
                    state.insert(path.clone(), observed);
                }
                Classification::Unchanged => {
                    trace!("[No metadata changes] {} ({})", path.display(), digest.short());
                    summary.unchanged += 1;
                }
                Classification::Mismatch { expected } => {
                    debug!(
                        "[Digest mismatch] {} ({} -> {})",
                        path.display(),
                        expected.short(),
                        digest.short()
                    );
                    summary.mismatched += 1;
                    sink.report(&MismatchReport {
                        path: path.clone(),
                        expected,
                        actual: digest,
                    })?;
                }
            }

            if let Some(callback) = &self.progress_callback {
                callback(ProgressInfo {
                    operation: "Scrubbing".to_string(),
                    current_item: Some(path.clone()),
                    processed: summary.files_seen,
                    bytes_processed: summary.bytes_hashed,
                });
            }

            seen.insert(path);
        }

        summary.excluded = excluded.get();
        summary.stale = state.iter().filter(|(path, _)| !seen.contains(*path)).count();
        summary.duration_ms = start.elapsed().as_millis() as u64;

        if summary.skipped > 0 {
            warn!(
                "Skipped {} unreadable entries under {:?}",
                summary.skipped, self.root_path
            );
        }
        if summary.stale > 0 {
            debug!("{} recorded entries were not seen in this scan", summary.stale);
        }
        debug!(
            "Scrubbed {} files ({} bytes) in {}ms: {} new, {} updated, {} unchanged, {} mismatched",
            summary.files_seen,
            summary.bytes_hashed,
            summary.duration_ms,
            summary.new,
            summary.updated,
            summary.unchanged,
            summary.mismatched
        );

        Ok(summary)
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || self.exclude_patterns.is_empty() {
            return false;
        }
        match utils::make_relative(entry.path(), &self.root_path) {
            Ok(relative) => self.exclude_set.is_match(relative),
            Err(_) => false,
        }
    }
}

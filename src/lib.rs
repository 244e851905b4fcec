//! # bitrot - a scrubber for silent data corruption
//!
//! Detects files whose content changed while nothing wrote to them.
//!
//! ## Overview
//!
//! Every run walks a directory tree, computes a SHA-256 digest of every regular
//! file, and compares it with what was recorded on the previous run:
//!
//! - a file seen for the first time is recorded
//! - a file whose size, mode or modification time changed was edited on
//!   purpose; its record is replaced without comment
//! - a file with identical metadata but a different digest has rotted; it is
//!   reported and its record is left alone so the next run reports it again
//!
//! The records for one tree live in a [`DirectoryState`], persisted between
//! runs as an LZ4-compressed JSON document in a per-user state directory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bitrot::{utils, Scrubber, StateDirectory, WriterSink};
//! use std::path::Path;
//!
//! # fn main() -> bitrot::Result<()> {
//! let root = utils::resolve_root(Path::new("/srv/archive"))?;
//! let state_dir = StateDirectory::resolve(None)?;
//! let mut state = state_dir.load_state(&root)?;
//!
//! let mut sink = WriterSink::new(std::io::stdout());
//! let summary = Scrubber::new(&root).compare(&mut state, &mut sink)?;
//!
//! state_dir.save_state(&state)?;
//! println!("{} files checked, {} corrupted", summary.files_seen, summary.mismatched);
//! # Ok(())
//! # }
//! ```
//!
//! ## Limitations
//!
//! - The filesystem clock is trusted: content changed together with any
//!   metadata change is accepted as an edit, and an edit that restores size,
//!   mode and mtime is reported as corruption.
//! - Records of deleted files are never pruned.
//! - Concurrent runs against the same root are not coordinated; the last one
//!   to save wins.
//!
//! ## Module Organization
//!
//! - [`scrubber`]: tree walk, classification, report sinks
//! - [`state`]: the in-memory state and its encoded form
//! - [`storage`]: the per-user state directory and state file naming
//! - [`compression`]: the LZ4 envelope around encoded state
//! - [`types`]: records, reports, summaries, configuration
//! - [`error`]: error types
//! - [`utils`]: digests, metadata, atomic writes

pub mod compression;
pub mod error;
pub mod scrubber;
pub mod state;
pub mod storage;
pub mod types;
pub mod utils;

pub use error::{BitrotError, Result};
pub use scrubber::{classify, Classification, ReportSink, Scrubber, WriterSink};
pub use state::DirectoryState;
pub use storage::StateDirectory;
pub use types::*;

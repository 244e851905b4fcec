//! Error types for the bitrot library
//!
//! This module defines all error types that can occur while loading state,
//! scanning a tree, or persisting state. [`BitrotError::user_message`] adds a
//! hint for the errors a user can act on.
//!
//! Only a small set of errors is fatal for a scan: everything in here that is
//! returned from a public function aborts the operation that produced it.
//! Per-entry walk problems (permission denied on a subdirectory, a file that
//! vanished between listing and stat) never become a `BitrotError`; they are
//! logged and counted by the scrubber instead.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the bitrot library
pub type Result<T> = std::result::Result<T, BitrotError>;

/// Main error type for all bitrot operations
#[derive(Debug, Error)]
pub enum BitrotError {
    /// I/O errors outside of file digesting (state file, report output)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The scan root cannot be made absolute/canonical
    #[error("Unable to resolve root directory {path:?}: {source}")]
    PathResolution {
        /// Path as supplied by the caller
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The per-user state directory cannot be resolved, created, or used
    #[error("State directory error at {path:?}: {reason}")]
    StateDirectory {
        /// Directory that was being prepared
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// A persisted state document exists but cannot be decoded
    #[error("Corrupt state: {0}")]
    CorruptState(String),

    /// A file's content could not be fully read while computing its digest
    #[error("Unable to read {path:?}: {source}")]
    FileRead {
        /// File being digested
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// An exclusion pattern failed to compile
    #[error("Invalid exclude pattern: {0}")]
    InvalidPattern(String),

    /// Decompression errors
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BitrotError {
    /// Create a corrupt state error with a custom message
    pub fn corrupt_state(msg: impl Into<String>) -> Self {
        BitrotError::CorruptState(msg.into())
    }

    /// Create a state directory error for `path`
    pub fn state_directory(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        BitrotError::StateDirectory {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a decompression error with a custom message
    pub fn decompression(msg: impl Into<String>) -> Self {
        BitrotError::Decompression(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        BitrotError::Internal(msg.into())
    }

    /// Check if this error happens before any file is scanned
    ///
    /// These errors leave both the filesystem and the persisted state untouched.
    pub fn is_fatal_before_scan(&self) -> bool {
        matches!(
            self,
            BitrotError::PathResolution { .. }
                | BitrotError::StateDirectory { .. }
                | BitrotError::CorruptState(_)
                | BitrotError::InvalidPattern(_)
        )
    }

    /// Check if this error indicates a damaged state document
    pub fn is_corruption(&self) -> bool {
        matches!(self, BitrotError::CorruptState(_))
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            BitrotError::CorruptState(msg) => {
                format!(
                    "The saved state could not be decoded ({}). It was left untouched; \
                     move it aside to start a fresh baseline.",
                    msg
                )
            }
            BitrotError::StateDirectory { path, reason } => {
                format!(
                    "Cannot use state directory {:?}: {}. Use --state-dir to pick another location.",
                    path, reason
                )
            }
            BitrotError::FileRead { path, source } => {
                format!(
                    "Reading {:?} failed: {}. No state was saved for this run.",
                    path, source
                )
            }
            _ => self.to_string(),
        }
    }
}

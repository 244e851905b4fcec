//! Per-user state directory
//!
//! Every scanned root gets its own state file inside one per-user directory:
//!
//! ```text
//! ~/.bitrot/
//! ├── bitrot_<sha256 of root A>.db
//! └── bitrot_<sha256 of root B>.db
//! ```
//!
//! The file name is derived from the canonical root path, so scanning the same
//! tree through a different relative path or symlink still finds its history.
//!
//! ## Resolution order
//!
//! 1. An explicit path passed to [`StateDirectory::resolve`]
//! 2. The `BITROT_STATE_DIR` environment variable
//! 3. `.bitrot` under the user's home directory
//!
//! The directory is created with mode `0700` when missing.
//!
//! ## Missing vs. corrupt state
//!
//! A missing state file means "first run" and yields an empty state. A state
//! file that exists but cannot be decoded is an error: silently starting over
//! would discard the only record of what the files used to contain.

use crate::error::{BitrotError, Result};
use crate::state::DirectoryState;
use crate::utils;
use directories::BaseDirs;
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the state directory under the user's home
pub const STATE_DIR_NAME: &str = ".bitrot";

/// Environment variable overriding the state directory
pub const STATE_DIR_ENV: &str = "BITROT_STATE_DIR";

/// Directory holding one state file per scanned root
#[derive(Debug, Clone)]
pub struct StateDirectory {
    path: PathBuf,
}

impl StateDirectory {
    /// Resolve and prepare the state directory
    ///
    /// # Errors
    ///
    /// [`BitrotError::StateDirectory`] if no home directory can be found, the
    /// directory cannot be created, or a non-directory already sits there.
    pub fn resolve(override_path: Option<&Path>) -> Result<Self> {
        let path = match override_path {
            Some(path) => path.to_path_buf(),
            None => default_state_dir()?,
        };
        Self::open(path)
    }

    /// Use `path` as the state directory, creating it if needed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => {
                return Err(BitrotError::state_directory(
                    &path,
                    "a non-directory with this name already exists",
                ));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                utils::create_private_dir(&path).map_err(|e| {
                    BitrotError::state_directory(&path, format!("unable to create: {}", e))
                })?;
                info!("Created state directory {:?}", path);
            }
            Err(e) => {
                return Err(BitrotError::state_directory(
                    &path,
                    format!("unable to stat: {}", e),
                ));
            }
        }

        Ok(Self { path })
    }

    /// Location of the state directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// State file used for `root`
    pub fn state_file_for(&self, root: &Path) -> PathBuf {
        self.path.join(state_file_name(root))
    }

    /// Load the state recorded for `root`
    ///
    /// Returns an empty state if nothing was recorded yet.
    ///
    /// # Errors
    ///
    /// [`BitrotError::CorruptState`] if the file exists but cannot be decoded or
    /// belongs to another root; [`BitrotError::Io`] if it cannot be read.
    pub fn load_state(&self, root: &Path) -> Result<DirectoryState> {
        let file_path = self.state_file_for(root);

        let file = match File::open(&file_path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No state for {:?} yet, starting a new baseline", root);
                return Ok(DirectoryState::new(root));
            }
            Err(e) => return Err(e.into()),
        };

        let state = DirectoryState::load(BufReader::new(file)).map_err(|e| match e {
            BitrotError::CorruptState(msg) => {
                BitrotError::corrupt_state(format!("{}: {}", file_path.display(), msg))
            }
            other => other,
        })?;

        if state.root() != root {
            return Err(BitrotError::corrupt_state(format!(
                "{} records root {:?}, expected {:?}",
                file_path.display(),
                state.root(),
                root
            )));
        }

        info!("Loaded {} entries from {:?}", state.len(), file_path);
        Ok(state)
    }

    /// Persist `state` to its state file, replacing the previous one atomically
    ///
    /// Returns the path written.
    pub fn save_state(&self, state: &DirectoryState) -> Result<PathBuf> {
        let file_path = self.state_file_for(state.root());
        let bytes = state.serialize()?;
        utils::atomic_write(&file_path, &bytes)?;

        debug!("Wrote {} bytes to {:?}", bytes.len(), file_path);
        info!("Saved {} entries to {:?}", state.len(), file_path);
        Ok(file_path)
    }
}

/// File name of the state for `root`
///
/// Hashes the raw path bytes, so roots that differ only in bytes that are not
/// valid UTF-8 still get distinct files.
pub fn state_file_name(root: &Path) -> String {
    format!("bitrot_{}.db", utils::hash_data(&utils::path_to_raw(root)))
}

fn default_state_dir() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(STATE_DIR_ENV) {
        return Ok(PathBuf::from(path));
    }
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(STATE_DIR_NAME))
        .ok_or_else(|| {
            BitrotError::state_directory(STATE_DIR_NAME, "no home directory for the current user")
        })
}

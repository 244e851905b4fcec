//! Utility functions for bitrot
//!
//! This module provides the filesystem helpers shared by the scrubber and the
//! state directory: streaming content digests, metadata extraction, path
//! encoding, atomic writes, and human-readable formatting.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use crate::utils::{escape_path, hash_file_content};
//! use std::path::Path;
//!
//! let path = Path::new("example.txt");
//! let (digest, bytes) = hash_file_content(path)?;
//! println!("{} {} ({} bytes)", escape_path(path), digest, bytes);
//! ```

use crate::error::{BitrotError, Result};
use crate::types::ContentDigest;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Read buffer used while digesting files
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Hash a file's full content using SHA-256
///
/// The file is streamed through the hasher in fixed-size chunks, so memory use
/// does not depend on file size. Returns the digest and the number of bytes
/// hashed.
///
/// # Errors
///
/// [`BitrotError::FileRead`] if the file cannot be opened or any read fails.
/// There is no partial-digest fallback.
pub fn hash_file_content(path: &Path) -> Result<(ContentDigest, u64)> {
    let read_error = |source: std::io::Error| BitrotError::FileRead {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(read_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let bytes_read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(e)),
        };
        hasher.update(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }

    Ok((ContentDigest::from_bytes(hasher.finalize().into()), total))
}

/// Hash arbitrary data using SHA-256, returning lowercase hex
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Metadata the scrubber compares between runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,
    /// Permission and file type bits
    pub mode: u32,
    /// Last modification timestamp
    pub modified: DateTime<Utc>,
}

impl FileMetadata {
    /// Extract comparable metadata from `fs::Metadata`
    pub fn from_fs(metadata: &fs::Metadata) -> std::io::Result<Self> {
        Ok(Self {
            size: metadata.len(),
            mode: get_mode(metadata),
            modified: DateTime::<Utc>::from(metadata.modified()?),
        })
    }
}

/// Get Unix mode bits (type and permissions) from metadata
#[cfg(unix)]
fn get_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    metadata.mode()
}

/// Get mode from metadata (Windows implementation)
#[cfg(windows)]
fn get_mode(metadata: &fs::Metadata) -> u32 {
    // Map the read-only attribute onto Unix-like permissions
    if metadata.permissions().readonly() {
        0o100444
    } else {
        0o100644
    }
}

/// Create a directory readable only by its owner
///
/// Does nothing to a directory that already exists.
pub fn create_private_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}

/// Resolve a scan root to its canonical absolute form
///
/// Symlinks in the root itself are resolved so the same tree always maps to
/// the same state file.
///
/// # Errors
///
/// [`BitrotError::PathResolution`] if the path does not exist or cannot be
/// resolved, or if it is not a directory.
pub fn resolve_root(path: &Path) -> Result<PathBuf> {
    let root = fs::canonicalize(path).map_err(|source| BitrotError::PathResolution {
        path: path.to_path_buf(),
        source,
    })?;
    if !root.is_dir() {
        return Err(BitrotError::PathResolution {
            path: path.to_path_buf(),
            source: std::io::Error::new(ErrorKind::Other, "not a directory"),
        });
    }
    Ok(root)
}

/// Make a path relative to a base path
///
/// Purely lexical: both paths are expected to come from the same walk, so no
/// canonicalization is attempted.
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .map_err(|_| BitrotError::internal(format!("Path {:?} is not under {:?}", path, base)))
}

/// Format bytes in human-readable form
///
/// Uses binary units (1024-based). Values below 1 KB are whole numbers.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Atomic file write (write to temp file, sync, then rename)
///
/// Either the previous content or the complete new content is visible at
/// `path`, never a partial write. The content reaches the disk before the
/// rename makes it visible.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let written = File::create(&temp_path).and_then(|mut file| {
        file.write_all(content)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|()| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    Ok(())
}

/// Raw platform bytes of a path
///
/// The OS bytes on Unix, little-endian UTF-16 code units on Windows. Lossless
/// for paths that are not valid UTF-8.
#[cfg(unix)]
pub fn path_to_raw(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

/// Raw platform bytes of a path (Windows implementation)
#[cfg(windows)]
pub fn path_to_raw(path: &Path) -> Vec<u8> {
    use std::os::windows::ffi::OsStrExt;
    path.as_os_str()
        .encode_wide()
        .flat_map(u16::to_le_bytes)
        .collect()
}

/// Rebuild a path from [`path_to_raw`] output
///
/// Returns `None` if the bytes cannot come from this platform.
#[cfg(unix)]
pub fn path_from_raw(raw: Vec<u8>) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStringExt;
    Some(PathBuf::from(std::ffi::OsString::from_vec(raw)))
}

/// Rebuild a path from [`path_to_raw`] output (Windows implementation)
#[cfg(windows)]
pub fn path_from_raw(raw: Vec<u8>) -> Option<PathBuf> {
    use std::os::windows::ffi::OsStringExt;
    if raw.len() % 2 != 0 {
        return None;
    }
    let wide: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Some(PathBuf::from(std::ffi::OsString::from_wide(&wide)))
}

/// Render a path on a single line
///
/// Control characters become escapes (`\n`, `\t`, `\u{1b}`) and bytes that
/// are not valid UTF-8 become `\xNN`. Everything else is kept as is.
pub fn escape_path(path: &Path) -> String {
    let mut escaped = String::new();

    #[cfg(unix)]
    {
        use std::fmt::Write as _;
        use std::os::unix::ffi::OsStrExt;

        for chunk in path.as_os_str().as_bytes().utf8_chunks() {
            chunk.valid().chars().for_each(|c| push_escaped(&mut escaped, c));
            for byte in chunk.invalid() {
                let _ = write!(escaped, "\\x{:02x}", byte);
            }
        }
    }

    #[cfg(not(unix))]
    path.to_string_lossy()
        .chars()
        .for_each(|c| push_escaped(&mut escaped, c));

    escaped
}

fn push_escaped(out: &mut String, c: char) {
    if c.is_control() {
        out.extend(c.escape_default());
    } else {
        out.push(c);
    }
}

/// Serde encoding for paths that may not be valid UTF-8
///
/// A UTF-8 path is written as a plain string. Any other path is written as
/// `{"hex": "<raw bytes>"}` using [`path_to_raw`].
pub(crate) mod serde_path {
    use super::{path_from_raw, path_to_raw};
    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;
    use std::path::{Path, PathBuf};

    pub fn serialize<P, S>(path: &P, serializer: S) -> Result<S::Ok, S::Error>
    where
        P: AsRef<Path>,
        S: Serializer,
    {
        let path = path.as_ref();
        match path.to_str() {
            Some(text) => serializer.serialize_str(text),
            None => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("hex", &hex::encode(path_to_raw(path)))?;
                map.end()
            }
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PathBuf, D::Error> {
        deserializer.deserialize_any(PathVisitor)
    }

    struct PathVisitor;

    impl<'de> Visitor<'de> for PathVisitor {
        type Value = PathBuf;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a path string or a {\"hex\": ...} object")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<PathBuf, E> {
            Ok(PathBuf::from(v))
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<PathBuf, A::Error> {
            let mut encoded: Option<String> = None;
            while let Some(key) = map.next_key::<String>()? {
                if key != "hex" {
                    return Err(de::Error::unknown_field(&key, &["hex"]));
                }
                encoded = Some(map.next_value()?);
            }
            let encoded = encoded.ok_or_else(|| de::Error::missing_field("hex"))?;
            let raw = hex::decode(&encoded).map_err(de::Error::custom)?;
            path_from_raw(raw).ok_or_else(|| de::Error::custom("path bytes invalid on this platform"))
        }
    }
}

//! LZ4 compression envelope for persisted state
//!
//! State documents are plain JSON, which compresses very well: the keys repeat
//! for every record and paths share long prefixes. This module wraps the encoded
//! document in a small self-identifying envelope.
//!
//! ## Format
//!
//! Every envelope starts with a 4-byte magic header:
//! - `LZ4B` (0x4C5A3442): LZ4 block with a little-endian size prefix follows
//! - `\0\0\0\0`: uncompressed data follows (used when compression does not help)
//!
//! Unlike a content store, a state envelope has no legacy formats to fall back
//! on: anything without one of the two headers is rejected, so a damaged state
//! file is never mistaken for an empty one.
//!
//! ## Examples
//!
//! ```rust
//! use bitrot::compression::CompressionEngine;
//!
//! let mut engine = CompressionEngine::new();
//! let data = br#"{"entries":{}}"#.repeat(20);
//! let envelope = engine.compress(&data);
//! assert_eq!(engine.decompress(&envelope)?, data);
//! # Ok::<(), bitrot::BitrotError>(())
//! ```

use crate::error::{BitrotError, Result};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use std::time::Instant;
use tracing::{debug, trace};

// Magic bytes to identify LZ4 compressed data
const LZ4_MAGIC: &[u8] = b"LZ4B"; // LZ4 Bitrot
const RAW_MAGIC: &[u8] = &[0, 0, 0, 0];

/// Payloads below this size are stored raw
const MIN_COMPRESS_SIZE: usize = 64;

/// Compression statistics for monitoring
#[derive(Debug, Default, Clone)]
pub struct CompressionStats {
    /// Number of payloads compressed
    pub payloads_compressed: usize,
    /// Number of payloads stored raw
    pub payloads_stored_raw: usize,
    /// Total bytes saved by compression
    pub bytes_saved: usize,
    /// Total compression time in milliseconds
    pub compression_time_ms: u64,
    /// Total decompression time in milliseconds
    pub decompression_time_ms: u64,
}

impl CompressionStats {
    /// Get compression ratio (0.0 to 1.0)
    ///
    /// The ratio of compressed payloads to total payloads processed.
    pub fn compression_ratio(&self) -> f64 {
        if self.payloads_compressed == 0 {
            return 0.0;
        }

        let total = self.payloads_compressed + self.payloads_stored_raw;
        self.payloads_compressed as f64 / total as f64
    }
}

/// Compression engine for state envelopes
///
/// The engine is not thread-safe; the state store creates one per operation.
#[derive(Debug, Default)]
pub struct CompressionEngine {
    stats: CompressionStats,
}

impl CompressionEngine {
    /// Create a new compression engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current compression statistics
    pub fn stats(&self) -> &CompressionStats {
        &self.stats
    }

    /// Wrap `content` in an envelope
    ///
    /// Returns the LZ4 envelope, or the raw envelope if compression would not
    /// make the payload smaller.
    pub fn compress(&mut self, content: &[u8]) -> Vec<u8> {
        let start = Instant::now();

        if content.len() < MIN_COMPRESS_SIZE {
            trace!("Payload too small to benefit from compression ({} bytes)", content.len());
            return self.store_raw(content);
        }

        let compressed = compress_prepend_size(content);

        if compressed.len() < content.len() {
            let saved = content.len() - compressed.len();
            self.stats.bytes_saved += saved;
            self.stats.payloads_compressed += 1;
            self.stats.compression_time_ms += start.elapsed().as_millis() as u64;

            debug!(
                "Compressed state: {} -> {} bytes (saved {:.1}%)",
                content.len(),
                compressed.len(),
                (saved as f64 / content.len() as f64) * 100.0
            );

            let mut result = Vec::with_capacity(LZ4_MAGIC.len() + compressed.len());
            result.extend_from_slice(LZ4_MAGIC);
            result.extend_from_slice(&compressed);
            result
        } else {
            trace!("Compression not beneficial, storing raw");
            self.store_raw(content)
        }
    }

    /// Unwrap an envelope produced by [`CompressionEngine::compress`]
    ///
    /// # Errors
    ///
    /// [`BitrotError::Decompression`] if the data is shorter than the header,
    /// carries an unknown header, or the LZ4 block is damaged.
    pub fn decompress(&mut self, content: &[u8]) -> Result<Vec<u8>> {
        let start = Instant::now();

        if content.len() < LZ4_MAGIC.len() {
            return Err(BitrotError::decompression("Content too short"));
        }

        if let Some(block) = content.strip_prefix(LZ4_MAGIC) {
            let decompressed = decompress_size_prepended(block).map_err(|e| {
                BitrotError::decompression(format!("LZ4 decompression failed: {}", e))
            })?;
            self.stats.decompression_time_ms += start.elapsed().as_millis() as u64;
            trace!("Decompressed {} bytes to {} bytes", content.len(), decompressed.len());
            Ok(decompressed)
        } else if let Some(raw) = content.strip_prefix(RAW_MAGIC) {
            Ok(raw.to_vec())
        } else {
            Err(BitrotError::decompression(format!(
                "Unknown envelope header {:02x?}",
                &content[..LZ4_MAGIC.len()]
            )))
        }
    }

    fn store_raw(&mut self, content: &[u8]) -> Vec<u8> {
        self.stats.payloads_stored_raw += 1;
        let mut result = Vec::with_capacity(RAW_MAGIC.len() + content.len());
        result.extend_from_slice(RAW_MAGIC);
        result.extend_from_slice(content);
        result
    }
}

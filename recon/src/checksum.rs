//! Streaming content fingerprints over buffered file reads

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::error::{ReconError, Result};

/// Default read buffer size for fingerprinting.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Checksum algorithms supported for content fingerprints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumAlgorithm {
    /// CRC-32, rendered as an 8-hex-digit uppercase string
    Crc32,
    /// Blake3 (longer fingerprint, collision resistant)
    Blake3,
}

impl Default for ChecksumAlgorithm {
    fn default() -> Self {
        Self::Crc32
    }
}

/// Streams file bytes through a checksum function with one reusable read
/// buffer. Total memory is O(buffer size), independent of file size.
///
/// The only property callers may rely on is that identical byte content
/// yields identical fingerprint strings. This is an integrity check, not a
/// security check: the default CRC-32 makes no collision-resistance claim.
pub struct Checksummer {
    algorithm: ChecksumAlgorithm,
    buffer: Vec<u8>,
}

impl Checksummer {
    /// Create a checksummer with the default buffer size.
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        Self::with_buffer_size(algorithm, DEFAULT_BUFFER_SIZE)
    }

    /// Create a checksummer with a custom buffer size.
    pub fn with_buffer_size(algorithm: ChecksumAlgorithm, buffer_size: usize) -> Self {
        Self {
            algorithm,
            buffer: vec![0u8; buffer_size.max(1)],
        }
    }

    /// Fingerprint the full byte content of the file at `path`.
    ///
    /// Fails if the stream cannot be fully read; a partial fingerprint is
    /// never returned.
    pub async fn fingerprint_file(&mut self, path: &Path) -> Result<String> {
        let mut file = fs::File::open(path).await.map_err(|e| {
            ReconError::checksum_error(path, format!("Failed to open file: {}", e))
        })?;

        match self.algorithm {
            ChecksumAlgorithm::Crc32 => {
                let mut hasher = crc32fast::Hasher::new();

                loop {
                    let bytes_read = file.read(&mut self.buffer).await.map_err(|e| {
                        ReconError::checksum_error(path, format!("Failed to read file: {}", e))
                    })?;

                    if bytes_read == 0 {
                        break;
                    }

                    hasher.update(&self.buffer[..bytes_read]);
                }

                Ok(format!("{:08X}", hasher.finalize()))
            }
            ChecksumAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();

                loop {
                    let bytes_read = file.read(&mut self.buffer).await.map_err(|e| {
                        ReconError::checksum_error(path, format!("Failed to read file: {}", e))
                    })?;

                    if bytes_read == 0 {
                        break;
                    }

                    hasher.update(&self.buffer[..bytes_read]);
                }

                Ok(hasher.finalize().to_hex().to_string())
            }
        }
    }
}

//! Scan file checksums
//!
//! Imported data files get a SHA-256 checksum recorded next to their path
//! so a later verification pass can tell whether the bytes on disk still
//! match what was imported.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Hex-encoded SHA-256 of a byte slice
pub fn checksum_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hex-encoded SHA-256 of a file's contents
pub async fn checksum_file(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| Error::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(checksum_bytes(&bytes))
}

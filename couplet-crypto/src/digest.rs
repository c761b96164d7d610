//! Content checksums for export and archive integrity.

use sha2::{Digest, Sha256};

/// One-way SHA-256 digest.
pub fn checksum(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Hex-encoded SHA-256 digest, the form persisted next to payloads.
pub fn checksum_hex(data: &[u8]) -> String {
    hex::encode(checksum(data))
}

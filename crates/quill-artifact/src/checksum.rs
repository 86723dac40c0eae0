//! Content checksums for locked artifacts.
//!
//! SHA-256 over the exact rendered bytes. The engine never inspects the
//! rendered content, only its digest.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  hex::encode(hasher.finalize())
}

/// Case-insensitive digest comparison, tolerant of surrounding whitespace.
pub fn checksums_match(stored: &str, supplied: &str) -> bool {
  stored.trim().eq_ignore_ascii_case(supplied.trim())
}

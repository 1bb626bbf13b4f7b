//! SHA-256 helpers used for prompt/response hashes and cache keys.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a string.
#[must_use]
pub fn sha256_hex(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

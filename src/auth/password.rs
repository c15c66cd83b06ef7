//! Password digests
//!
//! Credentials travel as digests and the stored value is compared for
//! equality, so the digest must be deterministic: SHA-256, base64-encoded.
//! Clients may precompute it and send a `digest` parameter instead of the
//! plaintext password.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

/// Digest a plaintext password for storage or comparison
pub fn digest(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    STANDARD.encode(hasher.finalize())
}

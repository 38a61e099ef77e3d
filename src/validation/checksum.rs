//! SHA-256 checksums.
//!
//! Footers are the hex digest of the canonical JSON encoding of the
//! header and body. `serde_json` maps are ordered, so a value that was
//! parsed and re-encoded produces the same bytes.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Compute SHA256 hash of raw bytes.
pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[derive(Serialize)]
struct ChecksumInput<'a, H: Serialize, B: Serialize> {
    header: &'a H,
    body: &'a B,
}

/// Checksum over a header/body pair.
pub fn checksum_of<H: Serialize, B: Serialize>(header: &H, body: &B) -> Result<String> {
    let bytes = serde_json::to_vec(&ChecksumInput { header, body })?;
    Ok(compute_hash(&bytes))
}

// src/monitor/detect.rs

//! Whole-page change detection via content hashing.
//!
//! A page's fingerprint is the SHA-256 digest of its full body. Detection
//! is at whole-page granularity; the engine never hashes a failed or
//! partial fetch, so an empty fingerprint always means "never polled".

use sha2::{Digest, Sha256};

/// Compute the fingerprint of a page body.
pub fn fingerprint(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Whether the page changed since the last poll.
///
/// True iff the digests differ or there is no previous digest.
pub fn has_changed(previous: &str, current: &str) -> bool {
    previous.is_empty() || previous != current
}

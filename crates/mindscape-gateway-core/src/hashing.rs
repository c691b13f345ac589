// crates/mindscape-gateway-core/src/hashing.rs
// ============================================================================
// Module: Canonical Input Hashing
// Description: RFC 8785 canonicalization and SHA-256 digests of call inputs.
// Purpose: Bind confirmation tokens to the exact inputs they approve.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Confirmation tokens carry a digest of the inputs they approve. Inputs are
//! canonicalized with RFC 8785 (JCS) first, so key order and whitespace in the
//! client's JSON never change the digest.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Label prefixed to every digest string.
pub const DIGEST_PREFIX: &str = "sha256:";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Returns `sha256:<hex>` over the canonical JSON of `value`.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn digest_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(digest_bytes(&bytes))
}

/// Returns `sha256:<hex>` over raw bytes.
#[must_use]
pub fn digest_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{DIGEST_PREFIX}{}", hex_encode(&digest))
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions."
    )]

    use serde_json::json;

    use super::digest_bytes;
    use super::digest_canonical_json;

    #[test]
    fn key_order_does_not_change_digest() {
        let left = digest_canonical_json(&json!({"a": 1, "b": [true, null]})).unwrap();
        let right = digest_canonical_json(&json!({"b": [true, null], "a": 1})).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn different_inputs_differ() {
        let left = digest_canonical_json(&json!({"page_id": 1})).unwrap();
        let right = digest_canonical_json(&json!({"page_id": 2})).unwrap();
        assert_ne!(left, right);
    }

    #[test]
    fn empty_bytes_match_known_digest() {
        assert_eq!(
            digest_bytes(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}

// crates/rally-core/src/fingerprint.rs
// ============================================================================
// Module: Rally Request Fingerprints
// Description: Canonical, order-independent identifiers for request params.
// Purpose: Let equivalent remote requests share one cache entry.
// Dependencies: serde, serde_jcs, sha2, thiserror
// ============================================================================

//! ## Overview
//! A fingerprint is the SHA-256 digest of the RFC 8785 (JCS) canonical JSON
//! form of a request parameter object. Canonicalization sorts object keys and
//! normalizes numbers, so two logically identical parameter objects always
//! produce the same fingerprint regardless of field order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fingerprint derivation failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FingerprintError {
    /// Params could not be canonicalized (for example non-finite floats).
    #[error("fingerprint canonicalization failed: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Fingerprint
// ============================================================================

/// Lowercase hex SHA-256 digest of canonical request params.
///
/// # Invariants
/// - Always 64 lowercase hex characters when produced by [`Fingerprint::of`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derives the fingerprint of `params`.
    ///
    /// # Errors
    ///
    /// Returns [`FingerprintError`] when `params` cannot be canonicalized.
    pub fn of<T: Serialize>(params: &T) -> Result<Self, FingerprintError> {
        let bytes = canonical_json_bytes(params)?;
        let digest = Sha256::digest(&bytes);
        Ok(Self(hex_encode(&digest)))
    }

    /// Returns the fingerprint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Serializes `value` to RFC 8785 canonical JSON bytes.
///
/// # Errors
///
/// Returns [`FingerprintError`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, FingerprintError> {
    serde_jcs::to_vec(value).map_err(|err| FingerprintError::Canonicalization(err.to_string()))
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::hex_encode;

    #[test]
    fn hex_encode_pads_and_lowercases_every_byte() {
        assert_eq!(hex_encode(&[0x00, 0x0f, 0xa5, 0xff]), "000fa5ff");
        assert_eq!(hex_encode(&[]), "");
    }
}

// crates/reservation-gate-core/src/core/hashing.rs
// ============================================================================
// Module: Reservation Gate Hashing
// Description: Content fingerprints for audit records.
// Purpose: Identify credentials in audit logs without storing them.
// Dependencies: sha2
// ============================================================================

//! ## Overview
//! Credentials are never logged. Audit events carry a SHA-256 fingerprint
//! instead, which is stable for a given token and irreversible.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns the lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[usize::from(byte >> 4)] as char);
        out.push(HEX[usize::from(byte & 0x0f)] as char);
    }
    out
}

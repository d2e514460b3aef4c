// crates/reservation-gate-core/src/core/identifiers.rs
// ============================================================================
// Module: Reservation Gate Identifiers
// Description: Tenant identity, reservation identifiers, and query limits.
// Purpose: Provide strongly typed, validated values for tenant-scoped lookups.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! [`Identity`] is the server-derived tenant key that scopes every query.
//! It serializes for audit and response payloads but intentionally does not
//! implement `Deserialize`: an identity can only be produced by server code,
//! never decoded out of caller-declared tool arguments.
//!
//! [`ReservationId`] and [`LatestLimit`] are parsed at the tool boundary so
//! malformed input fails before any storage layer is reached.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum identity length in bytes.
pub const MAX_IDENTITY_LENGTH: usize = 256;
/// Maximum raw reservation identifier length accepted for parsing.
pub const MAX_RESERVATION_ID_LENGTH: usize = 32;
/// Default number of reservations returned by latest-N lookups.
pub const DEFAULT_LATEST_LIMIT: u32 = 3;
/// Upper bound for latest-N lookups.
pub const MAX_LATEST_LIMIT: u32 = 50;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Identity subject was empty.
    #[error("identity must not be blank")]
    EmptyIdentity,
    /// Identity subject exceeded the length limit.
    #[error("identity exceeds {max} bytes", max = MAX_IDENTITY_LENGTH)]
    IdentityTooLong,
    /// Identity subject contained control characters.
    #[error("identity contains control characters")]
    IdentityControlCharacter,
    /// Reservation identifier was not provided.
    #[error("reservation id was not provided")]
    MissingReservationId,
    /// Reservation identifier was not numeric.
    #[error("invalid reservation id format: {0}")]
    MalformedReservationId(String),
    /// Latest-N limit was outside the accepted range.
    #[error("latest limit must be between 1 and {max}, got {0}", max = MAX_LATEST_LIMIT)]
    LimitOutOfRange(u32),
}

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Server-verified tenant key bound to a session.
///
/// # Invariants
/// - Not blank, at most [`MAX_IDENTITY_LENGTH`] bytes, no control characters.
/// - Never constructed from caller-declared tool arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Creates an identity from a subject produced by a trusted verifier or
    /// read back from a trusted store column.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the subject violates identity limits.
    pub fn from_verified_subject(subject: impl Into<String>) -> Result<Self, IdentifierError> {
        let subject = subject.into();
        if subject.trim().is_empty() {
            return Err(IdentifierError::EmptyIdentity);
        }
        if subject.len() > MAX_IDENTITY_LENGTH {
            return Err(IdentifierError::IdentityTooLong);
        }
        if subject.chars().any(char::is_control) {
            return Err(IdentifierError::IdentityControlCharacter);
        }
        Ok(Self(subject))
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Reservation Identifier
// ============================================================================

/// Numeric reservation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ReservationId(i64);

impl ReservationId {
    /// Creates a reservation identifier from a raw integer.
    #[must_use]
    pub const fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// Parses a caller-supplied reservation identifier.
    ///
    /// Surrounding whitespace is ignored; the remainder must be a base-10
    /// integer that fits in 64 bits.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::MissingReservationId`] for blank input and
    /// [`IdentifierError::MalformedReservationId`] for non-numeric input.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentifierError::MissingReservationId);
        }
        if trimmed.len() > MAX_RESERVATION_ID_LENGTH {
            return Err(IdentifierError::MalformedReservationId(truncate_for_message(trimmed)));
        }
        trimmed
            .parse::<i64>()
            .map(Self)
            .map_err(|_| IdentifierError::MalformedReservationId(trimmed.to_string()))
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl FromStr for ReservationId {
    type Err = IdentifierError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Latest Limit
// ============================================================================

/// Row limit for latest-N lookups.
///
/// # Invariants
/// - Always within `1..=MAX_LATEST_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LatestLimit(u32);

impl LatestLimit {
    /// Creates a validated limit.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::LimitOutOfRange`] for zero or oversized limits.
    pub const fn new(value: u32) -> Result<Self, IdentifierError> {
        if value == 0 || value > MAX_LATEST_LIMIT {
            return Err(IdentifierError::LimitOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Returns the limit value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Default for LatestLimit {
    fn default() -> Self {
        Self(DEFAULT_LATEST_LIMIT)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Truncates untrusted input before echoing it back in messages.
fn truncate_for_message(value: &str) -> String {
    let mut out: String = value.chars().take(MAX_RESERVATION_ID_LENGTH).collect();
    out.push_str("...");
    out
}

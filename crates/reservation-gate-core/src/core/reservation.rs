// crates/reservation-gate-core/src/core/reservation.rs
// ============================================================================
// Module: Reservation Records
// Description: Immutable reservation rows owned by a single identity.
// Purpose: Carry reservation data from storage to the tool response layer.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A [`Reservation`] is a read-only row as stored in the `reservations` table.
//! The `owner` column is typed as [`Identity`] so ownership checks compare
//! like with like.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::identifiers::Identity;
use crate::core::identifiers::ReservationId;

// ============================================================================
// SECTION: Reservation
// ============================================================================

/// Reservation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    /// Reservation identifier.
    pub id: ReservationId,
    /// Owning identity (`user_id` column).
    pub owner: Identity,
    /// Opaque reservation details payload.
    pub details: String,
    /// Reservation date.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

impl Reservation {
    /// Returns true when the reservation belongs to `identity`.
    #[must_use]
    pub fn is_owned_by(&self, identity: &Identity) -> bool {
        &self.owner == identity
    }

    /// Renders the reservation date as RFC 3339.
    ///
    /// Falls back to the unix timestamp when the date cannot be formatted
    /// (years outside RFC 3339's four-digit range).
    #[must_use]
    pub fn date_rfc3339(&self) -> String {
        self.date.format(&Rfc3339).unwrap_or_else(|_| self.date.unix_timestamp().to_string())
    }
}

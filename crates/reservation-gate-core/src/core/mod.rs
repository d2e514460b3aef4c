// crates/reservation-gate-core/src/core/mod.rs
// ============================================================================
// Module: Reservation Gate Core Types
// Description: Identifier, record, and hashing types.
// Purpose: Group the data model re-exported at the crate root.
// Dependencies: serde, sha2, time
// ============================================================================

//! ## Overview
//! Core data types for Reservation Gate. Everything here is pure data with
//! validation at construction time.

pub mod hashing;
pub mod identifiers;
pub mod reservation;

pub use identifiers::IdentifierError;
pub use identifiers::Identity;
pub use identifiers::LatestLimit;
pub use identifiers::ReservationId;
pub use reservation::Reservation;

// crates/reservation-gate-core/src/lib.rs
// ============================================================================
// Module: Reservation Gate Core Library
// Description: Public API surface for the Reservation Gate core.
// Purpose: Expose identity types, reservation records, and repository seams.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Reservation Gate core defines the tenant-scoped data model shared by the
//! storage backends and the MCP tool surface. It carries no I/O of its own:
//! storage crates implement [`ReservationRepository`] and the tool layer
//! consumes it through [`SharedReservationRepository`].
//!
//! Security posture: [`Identity`] values are server-derived and never decoded
//! from caller input.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::RepositoryError;
pub use interfaces::ReservationRepository;
pub use interfaces::SharedReservationRepository;

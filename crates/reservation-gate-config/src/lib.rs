// crates/reservation-gate-config/src/lib.rs
// ============================================================================
// Module: Reservation Gate Config Library
// Description: Configuration model, loading, and validation.
// Purpose: Single source of truth for reservation-gate.toml semantics.
// Dependencies: reservation-gate-core, reservation-gate-store-postgres, toml
// ============================================================================

//! ## Overview
//! `reservation-gate-config` defines the configuration model for the
//! reservation gate: database coordinates and pool sizing, credential
//! verification, and tool limits. Validation is strict and fails closed.
//! Deployment environment variables override file values for database
//! coordinates.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;

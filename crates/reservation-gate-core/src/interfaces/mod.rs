// crates/reservation-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Reservation Gate Interfaces
// Description: Backend-agnostic repository interface for reservation lookups.
// Purpose: Decouple the tool surface from concrete storage and pooling.
// Dependencies: async-trait, thiserror
// ============================================================================

//! ## Overview
//! [`ReservationRepository`] is the only data-access seam the tool layer sees.
//! Every operation takes the caller [`Identity`] explicitly; implementations
//! must filter by it inside the storage engine, in the same statement that
//! selects rows.
//!
//! ## Invariants
//! - A returned reservation is always owned by the identity passed in.
//! - Rows owned by another identity are indistinguishable from missing rows.
//! - Empty result sets are successful outcomes, not errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::Identity;
use crate::core::LatestLimit;
use crate::core::Reservation;
use crate::core::ReservationId;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Reservation repository errors.
///
/// Messages carry internal detail for logs and must not be forwarded to
/// tool callers verbatim.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Pool is saturated and the waiter queue is full.
    #[error("connection pool exhausted ({max_waiters} waiters queued)")]
    PoolExhausted {
        /// Configured waiter bound.
        max_waiters: usize,
    },
    /// Connection acquisition exceeded the configured timeout.
    #[error("connection pool timeout after {timeout_ms} ms: {detail}")]
    PoolTimeout {
        /// Configured acquisition timeout in milliseconds.
        timeout_ms: u64,
        /// Driver or pool detail.
        detail: String,
    },
    /// Database driver or query failure.
    #[error("database error: {0}")]
    Database(String),
    /// Stored data failed integrity checks.
    #[error("invalid reservation data: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Repository
// ============================================================================

/// Tenant-scoped reservation lookups.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Loads one reservation by id, scoped to `identity`.
    ///
    /// Returns `Ok(None)` when no row matches both the id and the identity.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] on pool or database failure.
    async fn get_by_id(
        &self,
        identity: &Identity,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, RepositoryError>;

    /// Loads the most recent reservations for `identity`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] on pool or database failure.
    async fn get_latest(
        &self,
        identity: &Identity,
        limit: LatestLimit,
    ) -> Result<Vec<Reservation>, RepositoryError>;
}

/// Shared repository handle used by the tool layer.
pub type SharedReservationRepository = Arc<dyn ReservationRepository>;

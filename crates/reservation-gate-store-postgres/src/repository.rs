// crates/reservation-gate-store-postgres/src/repository.rs
// ============================================================================
// Module: Pooled Reservation Repository
// Description: Tenant-scoped reservation queries over the shared pool.
// Purpose: Implement ReservationRepository with owner filtering in SQL.
// Dependencies: async-trait, r2d2, reservation-gate-core, tracing
// ============================================================================

//! ## Overview
//! Both queries filter by `user_id` in the same statement that selects rows,
//! with the caller identity bound as a parameter. A returned row whose owner
//! differs from the caller is treated as corrupt and fails closed.
//!
//! ## Invariants
//! - No query can return another identity's rows.
//! - Caller values never appear in SQL text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use r2d2::ManageConnection;
use reservation_gate_core::Identity;
use reservation_gate_core::LatestLimit;
use reservation_gate_core::RepositoryError;
use reservation_gate_core::Reservation;
use reservation_gate_core::ReservationId;
use reservation_gate_core::ReservationRepository;

use crate::executor::ReservationRow;
use crate::executor::SqlParam;
use crate::executor::Statement;
use crate::executor::StatementExecutor;
use crate::pool::ConnectionPoolManager;

// ============================================================================
// SECTION: SQL
// ============================================================================

/// Loads one reservation by id for one owner.
///
/// Columns and parameters are cast to the types the row decoder reads, so
/// `INTEGER` ids, `VARCHAR` owners, and `TIMESTAMP` dates decode the same as
/// the canonical schema. A `TIMESTAMP` column is read in the session time zone.
pub const SELECT_RESERVATION_BY_ID: &str = "SELECT id::BIGINT AS id, user_id::TEXT AS user_id, \
                                            reservation_details::TEXT AS reservation_details, \
                                            reservation_date::TIMESTAMPTZ AS reservation_date \
                                            FROM reservations WHERE id = $1::BIGINT AND user_id \
                                            = $2::TEXT";

/// Loads an owner's newest reservations.
pub const SELECT_LATEST_RESERVATIONS: &str = "SELECT id::BIGINT AS id, user_id::TEXT AS user_id, \
                                              reservation_details::TEXT AS reservation_details, \
                                              reservation_date::TIMESTAMPTZ AS reservation_date \
                                              FROM reservations WHERE user_id = $1::TEXT ORDER \
                                              BY reservation_date DESC, id DESC LIMIT $2::BIGINT";

/// Creates the reservations table and its owner index.
pub const RESERVATION_SCHEMA_DDL: &str = "CREATE TABLE IF NOT EXISTS reservations (id BIGSERIAL \
                                          PRIMARY KEY,user_id TEXT NOT NULL,reservation_details \
                                          TEXT NOT NULL,reservation_date TIMESTAMPTZ NOT \
                                          NULL);CREATE INDEX IF NOT EXISTS \
                                          idx_reservations_user_date ON reservations (user_id, \
                                          reservation_date DESC);";

// ============================================================================
// SECTION: Repository
// ============================================================================

/// Reservation repository backed by a [`ConnectionPoolManager`].
pub struct PooledReservationRepository<M: ManageConnection> {
    /// Shared pool manager.
    pool: Arc<ConnectionPoolManager<M>>,
}

impl<M> PooledReservationRepository<M>
where
    M: ManageConnection,
    M::Connection: StatementExecutor,
{
    /// Creates a repository over `pool`.
    #[must_use]
    pub const fn new(pool: Arc<ConnectionPoolManager<M>>) -> Self {
        Self {
            pool,
        }
    }

    /// Returns the underlying pool manager.
    #[must_use]
    pub const fn pool(&self) -> &Arc<ConnectionPoolManager<M>> {
        &self.pool
    }

    /// Creates the reservations table and index when missing.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] on pool or DDL failure.
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        self.pool
            .run(|connection: &mut M::Connection| {
                connection
                    .execute_batch(RESERVATION_SCHEMA_DDL)
                    .map_err(|err| RepositoryError::Database(err.to_string()))
            })
            .await
    }

    /// Runs a reservation query through the pool.
    async fn query(&self, statement: Statement) -> Result<Vec<ReservationRow>, RepositoryError> {
        self.pool
            .run(move |connection: &mut M::Connection| {
                connection
                    .query_reservations(&statement)
                    .map_err(|err| RepositoryError::Database(err.to_string()))
            })
            .await
    }
}

#[async_trait]
impl<M> ReservationRepository for PooledReservationRepository<M>
where
    M: ManageConnection,
    M::Connection: StatementExecutor,
{
    async fn get_by_id(
        &self,
        identity: &Identity,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, RepositoryError> {
        let statement = Statement::new(
            SELECT_RESERVATION_BY_ID,
            vec![SqlParam::BigInt(reservation_id.get()), SqlParam::Text(identity.to_string())],
        );
        let rows = self.query(statement).await?;
        if rows.len() > 1 {
            return Err(RepositoryError::Invalid(format!(
                "reservation id {reservation_id} matched {} rows",
                rows.len()
            )));
        }
        rows.into_iter().next().map(|row| owned_reservation(row, identity)).transpose()
    }

    async fn get_latest(
        &self,
        identity: &Identity,
        limit: LatestLimit,
    ) -> Result<Vec<Reservation>, RepositoryError> {
        let statement = Statement::new(
            SELECT_LATEST_RESERVATIONS,
            vec![SqlParam::Text(identity.to_string()), SqlParam::BigInt(i64::from(limit.get()))],
        );
        let rows = self.query(statement).await?;
        let max_rows = usize::try_from(limit.get()).unwrap_or(usize::MAX);
        if rows.len() > max_rows {
            return Err(RepositoryError::Invalid(format!(
                "latest query returned {} rows for limit {}",
                rows.len(),
                limit.get()
            )));
        }
        rows.into_iter().map(|row| owned_reservation(row, identity)).collect()
    }
}

/// Converts a row and verifies it belongs to `identity`.
fn owned_reservation(
    row: ReservationRow,
    identity: &Identity,
) -> Result<Reservation, RepositoryError> {
    let owner = Identity::from_verified_subject(row.user_id)
        .map_err(|err| RepositoryError::Invalid(err.to_string()))?;
    let reservation = Reservation {
        id: ReservationId::from_raw(row.id),
        owner,
        details: row.reservation_details,
        date: row.reservation_date,
    };
    if !reservation.is_owned_by(identity) {
        tracing::error!(reservation_id = row.id, "reservation owner mismatch");
        return Err(RepositoryError::Invalid("reservation owner mismatch".to_string()));
    }
    Ok(reservation)
}

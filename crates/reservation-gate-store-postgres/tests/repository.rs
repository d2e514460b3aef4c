// crates/reservation-gate-store-postgres/tests/repository.rs
// ============================================================================
// Module: Pooled Repository Tests
// Description: Validate tenant-scoped reservation queries.
// Purpose: Ensure no query can observe another identity's rows.
// Dependencies: reservation-gate-store-postgres, reservation-gate-core, tokio
// ============================================================================

//! ## Overview
//! Repository behavior over the in-memory table: ownership filtering,
//! ordering, parameter binding, and error surfacing.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use r2d2::ManageConnection;
use reservation_gate_core::Identity;
use reservation_gate_core::LatestLimit;
use reservation_gate_core::RepositoryError;
use reservation_gate_core::ReservationId;
use reservation_gate_core::ReservationRepository;
use reservation_gate_store_postgres::ConnectionPoolManager;
use reservation_gate_store_postgres::ExecutorError;
use reservation_gate_store_postgres::InMemoryConnectionManager;
use reservation_gate_store_postgres::InMemoryReservationTable;
use reservation_gate_store_postgres::PoolConfig;
use reservation_gate_store_postgres::PooledReservationRepository;
use reservation_gate_store_postgres::RESERVATION_SCHEMA_DDL;
use reservation_gate_store_postgres::ReservationRow;
use reservation_gate_store_postgres::SELECT_LATEST_RESERVATIONS;
use reservation_gate_store_postgres::SELECT_RESERVATION_BY_ID;
use reservation_gate_store_postgres::SqlParam;
use reservation_gate_store_postgres::Statement;
use reservation_gate_store_postgres::StatementExecutor;
use time::OffsetDateTime;
use time::macros::datetime;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds a row.
fn row(id: i64, user_id: &str, date: OffsetDateTime) -> ReservationRow {
    ReservationRow {
        id,
        user_id: user_id.to_string(),
        reservation_details: format!("reservation {id}"),
        reservation_date: date,
    }
}

/// Seeds five rows for `user_123` and one for `user_456`.
fn seeded_table() -> InMemoryReservationTable {
    let table = InMemoryReservationTable::new();
    table.insert(row(1, "user_123", datetime!(2024-01-01 12:00 UTC)));
    table.insert(row(2, "user_123", datetime!(2024-01-02 12:00 UTC)));
    table.insert(row(3, "user_123", datetime!(2024-01-03 12:00 UTC)));
    table.insert(row(4, "user_123", datetime!(2024-01-04 12:00 UTC)));
    table.insert(row(5, "user_123", datetime!(2024-01-05 12:00 UTC)));
    table.insert(row(6, "user_456", datetime!(2024-01-06 12:00 UTC)));
    table
}

/// Builds a repository over `table`.
fn repository(
    table: &InMemoryReservationTable,
) -> PooledReservationRepository<InMemoryConnectionManager> {
    let table = table.clone();
    let pool =
        ConnectionPoolManager::new(PoolConfig::default(), move || Ok(table.connection_manager()))
            .unwrap();
    PooledReservationRepository::new(Arc::new(pool))
}

/// Parses an identity.
fn identity(subject: &str) -> Identity {
    Identity::from_verified_subject(subject).unwrap()
}

// ============================================================================
// SECTION: Latest Reservations
// ============================================================================

#[tokio::test]
async fn latest_returns_three_newest_owned_rows_descending() {
    let table = seeded_table();
    let repository = repository(&table);
    let latest =
        repository.get_latest(&identity("user_123"), LatestLimit::default()).await.unwrap();
    let ids: Vec<i64> = latest.iter().map(|reservation| reservation.id.get()).collect();
    assert_eq!(ids, vec![5, 4, 3]);
    assert!(latest.iter().all(|reservation| reservation.owner.as_str() == "user_123"));
}

#[tokio::test]
async fn latest_for_identity_without_rows_is_empty() {
    let table = seeded_table();
    let repository = repository(&table);
    let latest =
        repository.get_latest(&identity("user_789"), LatestLimit::default()).await.unwrap();
    assert!(latest.is_empty());
}

#[tokio::test]
async fn latest_never_includes_foreign_rows() {
    let table = seeded_table();
    let repository = repository(&table);
    let latest =
        repository.get_latest(&identity("user_456"), LatestLimit::new(50).unwrap()).await.unwrap();
    let ids: Vec<i64> = latest.iter().map(|reservation| reservation.id.get()).collect();
    assert_eq!(ids, vec![6]);
}

// ============================================================================
// SECTION: Reservation By Id
// ============================================================================

#[tokio::test]
async fn get_by_id_returns_owned_row() {
    let table = seeded_table();
    let repository = repository(&table);
    let reservation = repository
        .get_by_id(&identity("user_123"), ReservationId::from_raw(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reservation.details, "reservation 2");
    assert_eq!(reservation.date_rfc3339(), "2024-01-02T12:00:00Z");
}

#[tokio::test]
async fn get_by_id_hides_rows_owned_by_others() {
    let table = seeded_table();
    let repository = repository(&table);
    let foreign =
        repository.get_by_id(&identity("user_123"), ReservationId::from_raw(6)).await.unwrap();
    assert!(foreign.is_none());
    let missing =
        repository.get_by_id(&identity("user_123"), ReservationId::from_raw(999)).await.unwrap();
    assert_eq!(foreign, missing);
    let owned =
        repository.get_by_id(&identity("user_456"), ReservationId::from_raw(6)).await.unwrap();
    assert!(owned.is_some());
}

#[tokio::test]
async fn repeated_reads_are_identical() {
    let table = seeded_table();
    let repository = repository(&table);
    let first =
        repository.get_by_id(&identity("user_123"), ReservationId::from_raw(4)).await.unwrap();
    let second =
        repository.get_by_id(&identity("user_123"), ReservationId::from_raw(4)).await.unwrap();
    assert_eq!(first, second);
}

// ============================================================================
// SECTION: Statements
// ============================================================================

#[tokio::test]
async fn caller_values_are_bound_as_parameters() {
    let table = seeded_table();
    let repository = repository(&table);
    repository.get_by_id(&identity("user_123"), ReservationId::from_raw(6)).await.unwrap();
    repository.get_latest(&identity("user_123"), LatestLimit::default()).await.unwrap();

    let executed = table.executed();
    assert_eq!(
        executed,
        vec![
            Statement::new(
                SELECT_RESERVATION_BY_ID,
                vec![SqlParam::BigInt(6), SqlParam::Text("user_123".to_string())],
            ),
            Statement::new(
                SELECT_LATEST_RESERVATIONS,
                vec![SqlParam::Text("user_123".to_string()), SqlParam::BigInt(3)],
            ),
        ]
    );
    assert!(executed.iter().all(|statement| !statement.sql.contains("user_123")));
}

#[test]
fn queries_cast_columns_and_parameters_to_decoded_types() {
    for sql in [SELECT_RESERVATION_BY_ID, SELECT_LATEST_RESERVATIONS] {
        for projection in [
            "id::BIGINT AS id",
            "user_id::TEXT AS user_id",
            "reservation_details::TEXT AS reservation_details",
            "reservation_date::TIMESTAMPTZ AS reservation_date",
        ] {
            assert!(sql.contains(projection), "{projection} missing from {sql}");
        }
    }
    assert!(SELECT_RESERVATION_BY_ID.contains("id = $1::BIGINT"));
    assert!(SELECT_RESERVATION_BY_ID.contains("user_id = $2::TEXT"));
    assert!(SELECT_LATEST_RESERVATIONS.contains("user_id = $1::TEXT"));
    assert!(SELECT_LATEST_RESERVATIONS.contains("LIMIT $2::BIGINT"));
}

#[tokio::test]
async fn ensure_schema_runs_ddl_batch() {
    let table = InMemoryReservationTable::new();
    let repository = repository(&table);
    repository.ensure_schema().await.unwrap();
    assert_eq!(table.batches(), vec![RESERVATION_SCHEMA_DDL]);
}

// ============================================================================
// SECTION: Failures
// ============================================================================

#[tokio::test]
async fn driver_errors_surface_as_database_errors() {
    let table = seeded_table();
    let repository = repository(&table);
    table.fail_statements_with("relation \"reservations\" does not exist");
    let err =
        repository.get_latest(&identity("user_123"), LatestLimit::default()).await.unwrap_err();
    let RepositoryError::Database(detail) = err else {
        panic!("expected database error, got {err:?}");
    };
    assert!(detail.contains("does not exist"));

    table.clear_failure();
    repository.get_latest(&identity("user_123"), LatestLimit::default()).await.unwrap();
}

/// Connection manager whose queries ignore the owner filter.
struct IgnoresOwnerManager;

/// Connection produced by [`IgnoresOwnerManager`].
struct IgnoresOwnerConnection;

impl ManageConnection for IgnoresOwnerManager {
    type Connection = IgnoresOwnerConnection;
    type Error = ExecutorError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        Ok(IgnoresOwnerConnection)
    }

    fn is_valid(&self, _conn: &mut Self::Connection) -> Result<(), Self::Error> {
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

impl StatementExecutor for IgnoresOwnerConnection {
    fn query_reservations(
        &mut self,
        _statement: &Statement,
    ) -> Result<Vec<ReservationRow>, ExecutorError> {
        Ok(vec![row(6, "user_456", datetime!(2024-01-06 12:00 UTC))])
    }

    fn execute_batch(&mut self, _sql: &'static str) -> Result<(), ExecutorError> {
        Ok(())
    }
}

#[tokio::test]
async fn foreign_rows_from_storage_fail_closed() {
    let pool = ConnectionPoolManager::new(PoolConfig::default(), || Ok(IgnoresOwnerManager))
        .unwrap();
    let repository = PooledReservationRepository::new(Arc::new(pool));
    let err = repository
        .get_by_id(&identity("user_123"), ReservationId::from_raw(6))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Invalid(_)));
    let err =
        repository.get_latest(&identity("user_123"), LatestLimit::default()).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Invalid(_)));
}

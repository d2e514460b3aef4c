// crates/reservation-gate-store-postgres/src/lib.rs
// ============================================================================
// Module: Reservation Gate Postgres Store
// Description: Pooled, tenant-scoped reservation storage on Postgres.
// Purpose: Provide the production ReservationRepository backend.
// Dependencies: reservation-gate-core, postgres, r2d2, r2d2_postgres, tokio
// ============================================================================

//! ## Overview
//! This crate owns the single shared connection pool
//! ([`ConnectionPoolManager`]) and the repository that runs tenant-scoped
//! statements through it ([`PooledReservationRepository`]). The pool is built
//! lazily on first use and exactly once, even under concurrent first access.
//! Blocking driver work always runs on `tokio` blocking workers.
//!
//! [`memory`] provides an in-memory connection manager with the same pooling
//! semantics for tests and local runs without a database.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod executor;
pub mod memory;
pub mod pool;
pub mod postgres;
pub mod repository;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use executor::ExecutorError;
pub use executor::ReservationRow;
pub use executor::SqlParam;
pub use executor::Statement;
pub use executor::StatementExecutor;
pub use memory::InMemoryConnection;
pub use memory::InMemoryConnectionManager;
pub use memory::InMemoryReservationTable;
pub use pool::ConnectionPoolManager;
pub use pool::PoolConfig;
pub use pool::PoolError;
pub use pool::PoolStatus;
pub use pool::SharedPool;
pub use postgres::PostgresConfigError;
pub use postgres::PostgresConnectionConfig;
pub use postgres::PostgresPoolManager;
pub use postgres::postgres_pool_manager;
pub use repository::PooledReservationRepository;
pub use repository::RESERVATION_SCHEMA_DDL;
pub use repository::SELECT_LATEST_RESERVATIONS;
pub use repository::SELECT_RESERVATION_BY_ID;

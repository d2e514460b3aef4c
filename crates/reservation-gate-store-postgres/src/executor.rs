// crates/reservation-gate-store-postgres/src/executor.rs
// ============================================================================
// Module: Statement Executor
// Description: Parameterized statement execution over a pooled connection.
// Purpose: Keep caller values out of SQL text and abstract the driver.
// Dependencies: postgres, thiserror, time
// ============================================================================

//! ## Overview
//! Statements are fixed `&'static str` SQL with positional parameters. Caller
//! supplied values only ever travel as [`SqlParam`] bindings, never as SQL
//! text. [`StatementExecutor`] is implemented for [`postgres::Client`] and for
//! the in-memory connection used in tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::types::ToSql;
use thiserror::Error;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Statements
// ============================================================================

/// Positional statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    /// `BIGINT` parameter.
    BigInt(i64),
    /// `TEXT` parameter.
    Text(String),
}

/// Fixed SQL text plus its bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// SQL text with `$n` placeholders.
    pub sql: &'static str,
    /// Parameters bound to the placeholders, in order.
    pub params: Vec<SqlParam>,
}

impl Statement {
    /// Creates a statement.
    #[must_use]
    pub const fn new(sql: &'static str, params: Vec<SqlParam>) -> Self {
        Self {
            sql,
            params,
        }
    }
}

/// Raw `reservations` row as returned by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRow {
    /// `id` column.
    pub id: i64,
    /// `user_id` column.
    pub user_id: String,
    /// `reservation_details` column.
    pub reservation_details: String,
    /// `reservation_date` column.
    pub reservation_date: OffsetDateTime,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Driver-level execution error.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExecutorError {
    /// Driver detail.
    message: String,
}

impl ExecutorError {
    /// Creates an executor error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the driver detail.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Executes reservation statements on a checked-out connection.
pub trait StatementExecutor {
    /// Runs a query returning reservation rows.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when the statement fails.
    fn query_reservations(
        &mut self,
        statement: &Statement,
    ) -> Result<Vec<ReservationRow>, ExecutorError>;

    /// Runs a parameterless batch, such as schema DDL.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when the batch fails.
    fn execute_batch(&mut self, sql: &'static str) -> Result<(), ExecutorError>;
}

impl StatementExecutor for postgres::Client {
    fn query_reservations(
        &mut self,
        statement: &Statement,
    ) -> Result<Vec<ReservationRow>, ExecutorError> {
        let params: Vec<&(dyn ToSql + Sync)> = statement
            .params
            .iter()
            .map(|param| match param {
                SqlParam::BigInt(value) => value as &(dyn ToSql + Sync),
                SqlParam::Text(value) => value as &(dyn ToSql + Sync),
            })
            .collect();
        let rows = self
            .query(statement.sql, params.as_slice())
            .map_err(|err| ExecutorError::new(err.to_string()))?;
        rows.iter().map(decode_row).collect()
    }

    fn execute_batch(&mut self, sql: &'static str) -> Result<(), ExecutorError> {
        self.batch_execute(sql).map_err(|err| ExecutorError::new(err.to_string()))
    }
}

/// Decodes one driver row by column name.
fn decode_row(row: &postgres::Row) -> Result<ReservationRow, ExecutorError> {
    let id: i64 = row.try_get("id").map_err(|err| ExecutorError::new(err.to_string()))?;
    let user_id: String =
        row.try_get("user_id").map_err(|err| ExecutorError::new(err.to_string()))?;
    let reservation_details: String =
        row.try_get("reservation_details").map_err(|err| ExecutorError::new(err.to_string()))?;
    let reservation_date: OffsetDateTime =
        row.try_get("reservation_date").map_err(|err| ExecutorError::new(err.to_string()))?;
    Ok(ReservationRow {
        id,
        user_id,
        reservation_details,
        reservation_date,
    })
}

// crates/reservation-gate-store-postgres/src/memory.rs
// ============================================================================
// Module: In-Memory Reservation Table
// Description: In-memory connection manager that executes reservation SQL.
// Purpose: Exercise pooling and repository semantics without a database.
// Dependencies: r2d2
// ============================================================================

//! ## Overview
//! [`InMemoryReservationTable`] stands in for the `reservations` table.
//! [`InMemoryConnectionManager`] plugs into [`crate::ConnectionPoolManager`]
//! like the Postgres manager does, so pool sizing, timeouts, and release
//! behave identically. Every executed statement is recorded with its bound
//! parameters so callers can assert nothing was spliced into SQL text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use r2d2::ManageConnection;

use crate::executor::ExecutorError;
use crate::executor::ReservationRow;
use crate::executor::SqlParam;
use crate::executor::Statement;
use crate::executor::StatementExecutor;
use crate::repository::SELECT_LATEST_RESERVATIONS;
use crate::repository::SELECT_RESERVATION_BY_ID;

// ============================================================================
// SECTION: Table
// ============================================================================

/// Mutable table state behind the shared lock.
#[derive(Debug, Default)]
struct TableState {
    /// Stored rows.
    rows: Vec<ReservationRow>,
    /// Executed queries, in order.
    executed: Vec<Statement>,
    /// Executed batches, in order.
    batches: Vec<&'static str>,
    /// Failure injected into every subsequent statement.
    failure: Option<String>,
    /// Connections opened by managers over this table.
    connects: usize,
}

/// Shared in-memory `reservations` table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReservationTable {
    /// Shared state.
    state: Arc<Mutex<TableState>>,
}

impl InMemoryReservationTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row.
    pub fn insert(&self, row: ReservationRow) {
        self.lock().rows.push(row);
    }

    /// Returns every executed query, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<Statement> {
        self.lock().executed.clone()
    }

    /// Returns every executed batch, in order.
    #[must_use]
    pub fn batches(&self) -> Vec<&'static str> {
        self.lock().batches.clone()
    }

    /// Returns the number of connections opened against this table.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    /// Makes every subsequent statement fail with `message`.
    pub fn fail_statements_with(&self, message: impl Into<String>) {
        self.lock().failure = Some(message.into());
    }

    /// Clears an injected failure.
    pub fn clear_failure(&self) {
        self.lock().failure = None;
    }

    /// Returns a connection manager over this table.
    #[must_use]
    pub fn connection_manager(&self) -> InMemoryConnectionManager {
        InMemoryConnectionManager {
            table: self.clone(),
        }
    }

    /// Locks table state, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Connection Manager
// ============================================================================

/// r2d2 connection manager over an [`InMemoryReservationTable`].
#[derive(Debug, Clone)]
pub struct InMemoryConnectionManager {
    /// Backing table.
    table: InMemoryReservationTable,
}

impl ManageConnection for InMemoryConnectionManager {
    type Connection = InMemoryConnection;
    type Error = ExecutorError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.table.lock().connects += 1;
        Ok(InMemoryConnection {
            table: self.table.clone(),
        })
    }

    fn is_valid(&self, _conn: &mut Self::Connection) -> Result<(), Self::Error> {
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Pooled in-memory connection.
#[derive(Debug)]
pub struct InMemoryConnection {
    /// Backing table.
    table: InMemoryReservationTable,
}

impl StatementExecutor for InMemoryConnection {
    fn query_reservations(
        &mut self,
        statement: &Statement,
    ) -> Result<Vec<ReservationRow>, ExecutorError> {
        let mut state = self.table.lock();
        state.executed.push(statement.clone());
        if let Some(message) = &state.failure {
            return Err(ExecutorError::new(message.clone()));
        }
        match (statement.sql, statement.params.as_slice()) {
            (SELECT_RESERVATION_BY_ID, [SqlParam::BigInt(id), SqlParam::Text(owner)]) => Ok(state
                .rows
                .iter()
                .filter(|row| row.id == *id && row.user_id == *owner)
                .cloned()
                .collect()),
            (SELECT_LATEST_RESERVATIONS, [SqlParam::Text(owner), SqlParam::BigInt(limit)]) => {
                let mut rows: Vec<ReservationRow> =
                    state.rows.iter().filter(|row| row.user_id == *owner).cloned().collect();
                rows.sort_by(|a, b| {
                    b.reservation_date.cmp(&a.reservation_date).then_with(|| b.id.cmp(&a.id))
                });
                rows.truncate(usize::try_from(*limit).unwrap_or(0));
                Ok(rows)
            }
            (sql, _) => Err(ExecutorError::new(format!("unsupported statement: {sql}"))),
        }
    }

    fn execute_batch(&mut self, sql: &'static str) -> Result<(), ExecutorError> {
        let mut state = self.table.lock();
        state.batches.push(sql);
        state.failure.as_ref().map_or(Ok(()), |message| Err(ExecutorError::new(message.clone())))
    }
}

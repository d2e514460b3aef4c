// crates/reservation-gate-store-postgres/src/postgres.rs
// ============================================================================
// Module: Postgres Connection Settings
// Description: Postgres driver configuration and pool manager construction.
// Purpose: Turn database settings into a lazily connecting r2d2 manager.
// Dependencies: postgres, r2d2_postgres, serde
// ============================================================================

//! ## Overview
//! [`PostgresConnectionConfig`] holds the database coordinates. When a Cloud
//! SQL instance connection name is set, the driver connects through the
//! `/cloudsql/<instance>` unix socket instead of TCP. Statement timeouts are
//! applied server-side through the connection `options` string.
//!
//! Building a manager never opens a connection; the first pool use does.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use postgres::NoTls;
use r2d2_postgres::PostgresConnectionManager;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::pool::ConnectionPoolManager;
use crate::pool::PoolConfig;
use crate::pool::PoolError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Directory holding Cloud SQL unix sockets.
pub const CLOUD_SQL_SOCKET_DIR: &str = "/cloudsql";
/// Application name reported to the server.
const APPLICATION_NAME: &str = "reservation-gate";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Postgres connection settings errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PostgresConfigError {
    /// A required field is empty.
    #[error("database.{0} must be set")]
    Missing(&'static str),
    /// Cloud SQL instance connection name is malformed.
    #[error("database.instance_connection_name must be project:region:instance")]
    InvalidInstanceName,
    /// A timeout is zero.
    #[error("database.{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Postgres connection settings.
///
/// Embedded by flattening into the `[database]` config section, so unknown
/// keys are not rejected here.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PostgresConnectionConfig {
    /// TCP host, ignored when `instance_connection_name` is set.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database user.
    #[serde(default)]
    pub user: String,
    /// Database password.
    #[serde(default)]
    pub password: Option<String>,
    /// Database name.
    #[serde(default)]
    pub dbname: String,
    /// Cloud SQL instance connection name (`project:region:instance`).
    #[serde(default)]
    pub instance_connection_name: Option<String>,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Server-side statement timeout in milliseconds.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
    /// Create the reservations table at startup when missing.
    #[serde(default)]
    pub ensure_schema: bool,
}

impl Default for PostgresConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: String::new(),
            password: None,
            dbname: String::new(),
            instance_connection_name: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            statement_timeout_ms: default_statement_timeout_ms(),
            ensure_schema: false,
        }
    }
}

impl fmt::Debug for PostgresConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("dbname", &self.dbname)
            .field("instance_connection_name", &self.instance_connection_name)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .field("ensure_schema", &self.ensure_schema)
            .finish()
    }
}

impl PostgresConnectionConfig {
    /// Validates required fields and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresConfigError`] when a field is missing or malformed.
    pub fn validate(&self) -> Result<(), PostgresConfigError> {
        if self.user.trim().is_empty() {
            return Err(PostgresConfigError::Missing("user"));
        }
        if self.dbname.trim().is_empty() {
            return Err(PostgresConfigError::Missing("dbname"));
        }
        match &self.instance_connection_name {
            Some(name) if !is_valid_instance_name(name) => {
                return Err(PostgresConfigError::InvalidInstanceName);
            }
            Some(_) => {}
            None if self.host.trim().is_empty() => {
                return Err(PostgresConfigError::Missing("host"));
            }
            None => {}
        }
        if self.connect_timeout_ms == 0 {
            return Err(PostgresConfigError::ZeroTimeout("connect_timeout_ms"));
        }
        if self.statement_timeout_ms == 0 {
            return Err(PostgresConfigError::ZeroTimeout("statement_timeout_ms"));
        }
        Ok(())
    }

    /// Returns the host the driver connects to: the Cloud SQL socket
    /// directory when an instance is configured, otherwise the TCP host.
    #[must_use]
    pub fn effective_host(&self) -> String {
        self.instance_connection_name.as_ref().map_or_else(
            || self.host.clone(),
            |instance| format!("{CLOUD_SQL_SOCKET_DIR}/{instance}"),
        )
    }

    /// Builds the driver configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresConfigError`] when the settings are invalid.
    pub fn to_postgres_config(&self) -> Result<postgres::Config, PostgresConfigError> {
        self.validate()?;
        let options = format!("-c statement_timeout={}", self.statement_timeout_ms);
        let mut config = postgres::Config::new();
        config
            .host(&self.effective_host())
            .port(self.port)
            .user(&self.user)
            .dbname(&self.dbname)
            .application_name(APPLICATION_NAME)
            .connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .options(&options);
        if let Some(password) = &self.password {
            config.password(password);
        }
        Ok(config)
    }
}

/// Returns true for `project:region:instance` names.
fn is_valid_instance_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split(':').collect();
    (parts.len() == 3 || parts.len() == 4)
        && parts.iter().all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        })
}

/// Default for [`PostgresConnectionConfig::host`].
fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Default for [`PostgresConnectionConfig::port`].
const fn default_port() -> u16 {
    5432
}

/// Default for [`PostgresConnectionConfig::connect_timeout_ms`].
const fn default_connect_timeout_ms() -> u64 {
    5_000
}

/// Default for [`PostgresConnectionConfig::statement_timeout_ms`].
const fn default_statement_timeout_ms() -> u64 {
    30_000
}

// ============================================================================
// SECTION: Pool Construction
// ============================================================================

/// Pool manager over real Postgres connections.
pub type PostgresPoolManager = ConnectionPoolManager<PostgresConnectionManager<NoTls>>;

/// Creates a lazily connecting Postgres pool manager.
///
/// # Errors
///
/// Returns [`PoolError::Config`] when either configuration is invalid.
pub fn postgres_pool_manager(
    connection: &PostgresConnectionConfig,
    pool: PoolConfig,
) -> Result<PostgresPoolManager, PoolError> {
    let driver_config =
        connection.to_postgres_config().map_err(|err| PoolError::Config(err.to_string()))?;
    ConnectionPoolManager::new(pool, move || {
        Ok(PostgresConnectionManager::new(driver_config.clone(), NoTls))
    })
}

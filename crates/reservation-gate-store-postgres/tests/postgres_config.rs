// crates/reservation-gate-store-postgres/tests/postgres_config.rs
// ============================================================================
// Module: Postgres Settings Tests
// Description: Validate driver configuration and lazy manager construction.
// Purpose: Ensure database settings map onto the driver without connecting.
// Dependencies: reservation-gate-store-postgres, postgres
// ============================================================================

//! ## Overview
//! Settings validation, Cloud SQL socket selection, and secret redaction.

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

use postgres::config::Host;
use reservation_gate_store_postgres::PoolConfig;
use reservation_gate_store_postgres::PostgresConfigError;
use reservation_gate_store_postgres::PostgresConnectionConfig;
use reservation_gate_store_postgres::postgres_pool_manager;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Minimal valid TCP settings.
fn tcp_config() -> PostgresConnectionConfig {
    PostgresConnectionConfig {
        user: "reservations".to_string(),
        password: Some("hunter2".to_string()),
        dbname: "reservations".to_string(),
        ..PostgresConnectionConfig::default()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn tcp_settings_map_onto_driver_config() {
    let driver = tcp_config().to_postgres_config().unwrap();
    assert_eq!(driver.get_hosts(), &[Host::Tcp("127.0.0.1".to_string())]);
    assert_eq!(driver.get_ports(), &[5432]);
    assert_eq!(driver.get_user(), Some("reservations"));
    assert_eq!(driver.get_dbname(), Some("reservations"));
    assert_eq!(driver.get_options(), Some("-c statement_timeout=30000"));
}

#[cfg(unix)]
#[test]
fn cloud_sql_instance_uses_unix_socket() {
    let config = PostgresConnectionConfig {
        instance_connection_name: Some("acme:us-central1:reservations".to_string()),
        ..tcp_config()
    };
    assert_eq!(config.effective_host(), "/cloudsql/acme:us-central1:reservations");
    let driver = config.to_postgres_config().unwrap();
    assert_eq!(
        driver.get_hosts(),
        &[Host::Unix("/cloudsql/acme:us-central1:reservations".into())]
    );
}

#[test]
fn incomplete_settings_are_rejected() {
    let missing_user = PostgresConnectionConfig {
        user: String::new(),
        ..tcp_config()
    };
    assert_eq!(missing_user.validate(), Err(PostgresConfigError::Missing("user")));

    let missing_db = PostgresConnectionConfig {
        dbname: " ".to_string(),
        ..tcp_config()
    };
    assert_eq!(missing_db.validate(), Err(PostgresConfigError::Missing("dbname")));

    let bad_instance = PostgresConnectionConfig {
        instance_connection_name: Some("not-an-instance".to_string()),
        ..tcp_config()
    };
    assert_eq!(bad_instance.validate(), Err(PostgresConfigError::InvalidInstanceName));

    let zero_timeout = PostgresConnectionConfig {
        statement_timeout_ms: 0,
        ..tcp_config()
    };
    assert_eq!(
        zero_timeout.validate(),
        Err(PostgresConfigError::ZeroTimeout("statement_timeout_ms"))
    );
}

#[test]
fn debug_output_redacts_password() {
    let rendered = format!("{:?}", tcp_config());
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("<redacted>"));
}

#[test]
fn manager_construction_does_not_connect() {
    let manager = postgres_pool_manager(&tcp_config(), PoolConfig::default()).unwrap();
    assert!(!manager.is_initialized());
    assert!(manager.status().is_none());
}

#[test]
fn invalid_settings_fail_manager_construction() {
    let config = PostgresConnectionConfig {
        user: String::new(),
        ..tcp_config()
    };
    assert!(postgres_pool_manager(&config, PoolConfig::default()).is_err());
}

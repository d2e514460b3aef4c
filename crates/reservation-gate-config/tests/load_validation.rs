// crates/reservation-gate-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load Validation Tests
// Description: Validate loading, env overrides, and fail-closed validation.
// Purpose: Ensure unusable configurations are rejected before startup.
// Dependencies: reservation-gate-config, tempfile
// ============================================================================

//! ## Overview
//! Loading and validation tests over temporary config files.

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

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use reservation_gate_config::AuthMode;
use reservation_gate_config::CONFIG_ENV_VAR;
use reservation_gate_config::ConfigError;
use reservation_gate_config::ReservationGateConfig;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// A complete token-info configuration.
const TOKEN_INFO_CONFIG: &str = r#"
[database]
user = "reservations"
dbname = "reservations"

[database.pool]
pool_size = 4
max_overflow = 1

[auth]
mode = "token_info"

[auth.token_info]
audiences = ["client-123.apps.googleusercontent.com"]

[tools]
latest_limit = 5
"#;

/// A complete static-token configuration.
const STATIC_CONFIG: &str = r#"
[database]
user = "reservations"
dbname = "reservations"

[auth]
mode = "static"

[[auth.static_tokens]]
token = "dev-token"
subject = "user_123"
"#;

/// Writes `content` to a config file inside `dir`.
fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("reservation-gate.toml");
    fs::write(&path, content).unwrap();
    path
}

/// Loads `path` with an empty environment.
fn load_isolated(path: &Path) -> Result<ReservationGateConfig, ConfigError> {
    ReservationGateConfig::load_with_env(Some(path), |_| None)
}

/// Loads `path` with the given environment.
fn load_with(path: &Path, vars: &[(&str, &str)]) -> Result<ReservationGateConfig, ConfigError> {
    let env: BTreeMap<String, String> =
        vars.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect();
    ReservationGateConfig::load_with_env(Some(path), move |key| env.get(key).cloned())
}

// ============================================================================
// SECTION: Loading
// ============================================================================

#[test]
fn token_info_config_loads_with_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_isolated(&write_config(&dir, TOKEN_INFO_CONFIG)).unwrap();

    assert_eq!(config.auth.mode, AuthMode::TokenInfo);
    assert_eq!(config.auth.token_info.endpoint, "https://oauth2.googleapis.com/tokeninfo");
    assert_eq!(
        config.auth.token_info.issuers,
        vec!["accounts.google.com".to_string(), "https://accounts.google.com".to_string()]
    );
    assert_eq!(config.database.connection.port, 5432);
    assert_eq!(config.database.pool.pool_size, 4);
    assert_eq!(config.database.pool.max_overflow, 1);
    assert_eq!(config.database.pool.acquire_timeout_ms, 30_000);
    assert_eq!(config.tools.latest().unwrap().get(), 5);
}

#[test]
fn static_config_loads() {
    let dir = TempDir::new().unwrap();
    let config = load_isolated(&write_config(&dir, STATIC_CONFIG)).unwrap();
    assert_eq!(config.auth.mode, AuthMode::Static);
    assert_eq!(config.auth.static_tokens.len(), 1);
    assert_eq!(config.tools.latest().unwrap().get(), 3);
}

#[test]
fn config_path_resolves_from_env() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, STATIC_CONFIG);
    let path_text = path.to_string_lossy().to_string();
    let config = ReservationGateConfig::load_with_env(None, move |key| {
        (key == CONFIG_ENV_VAR).then(|| path_text.clone())
    })
    .unwrap();
    assert_eq!(config.auth.mode, AuthMode::Static);
}

#[test]
fn missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = load_isolated(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn unknown_sections_are_rejected() {
    let dir = TempDir::new().unwrap();
    let content = format!("{STATIC_CONFIG}\n[server]\nport = 80\n");
    let err = load_isolated(&write_config(&dir, &content)).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn non_utf8_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reservation-gate.toml");
    fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
    let err = load_isolated(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

// ============================================================================
// SECTION: Environment Overrides
// ============================================================================

#[test]
fn database_env_vars_override_file_values() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, TOKEN_INFO_CONFIG);
    let config = load_with(
        &path,
        &[
            ("DB_USER", "app"),
            ("DB_PASSWORD", "secret"),
            ("DB_NAME", "prod_reservations"),
            ("DB_HOST", "10.0.0.5"),
            ("DB_PORT", "6432"),
            ("CLOUD_SQL_INSTANCE_CONNECTION_NAME", "acme:us-central1:db"),
        ],
    )
    .unwrap();
    let connection = &config.database.connection;
    assert_eq!(connection.user, "app");
    assert_eq!(connection.password.as_deref(), Some("secret"));
    assert_eq!(connection.dbname, "prod_reservations");
    assert_eq!(connection.host, "10.0.0.5");
    assert_eq!(connection.port, 6432);
    assert_eq!(connection.instance_connection_name.as_deref(), Some("acme:us-central1:db"));
}

#[test]
fn empty_env_values_are_ignored() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, TOKEN_INFO_CONFIG);
    let config = load_with(&path, &[("DB_USER", "  ")]).unwrap();
    assert_eq!(config.database.connection.user, "reservations");
}

#[test]
fn malformed_port_override_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, TOKEN_INFO_CONFIG);
    let err = load_with(&path, &[("DB_PORT", "not-a-port")]).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn token_info_without_audiences_fails_closed() {
    let dir = TempDir::new().unwrap();
    let content = TOKEN_INFO_CONFIG.replace(
        "audiences = [\"client-123.apps.googleusercontent.com\"]",
        "audiences = []",
    );
    let err = load_isolated(&write_config(&dir, &content)).unwrap_err();
    assert!(err.to_string().contains("audiences"));
}

#[test]
fn plaintext_remote_endpoint_is_rejected() {
    let dir = TempDir::new().unwrap();
    let content = TOKEN_INFO_CONFIG.replace(
        "[auth.token_info]\n",
        "[auth.token_info]\nendpoint = \"http://tokeninfo.example.com\"\n",
    );
    let err = load_isolated(&write_config(&dir, &content)).unwrap_err();
    assert!(err.to_string().contains("https"));
}

#[test]
fn static_mode_requires_tokens_and_valid_subjects() {
    let mut config = ReservationGateConfig::default();
    config.database.connection.user = "reservations".to_string();
    config.database.connection.dbname = "reservations".to_string();
    config.auth.mode = AuthMode::Static;
    assert!(config.validate().is_err());

    let dir = TempDir::new().unwrap();
    let content = STATIC_CONFIG.replace("subject = \"user_123\"", "subject = \"\"");
    assert!(load_isolated(&write_config(&dir, &content)).is_err());
}

#[test]
fn out_of_range_latest_limit_is_rejected() {
    let dir = TempDir::new().unwrap();
    let content = format!("{STATIC_CONFIG}\n[tools]\nlatest_limit = 0\n");
    let err = load_isolated(&write_config(&dir, &content)).unwrap_err();
    assert!(err.to_string().contains("latest_limit"));
}

#[test]
fn invalid_pool_settings_are_rejected() {
    let dir = TempDir::new().unwrap();
    let content = TOKEN_INFO_CONFIG.replace("pool_size = 4", "pool_size = 0");
    let err = load_isolated(&write_config(&dir, &content)).unwrap_err();
    assert!(err.to_string().contains("database.pool"));
}

#[test]
fn missing_database_user_is_rejected() {
    let dir = TempDir::new().unwrap();
    let content = STATIC_CONFIG.replace("user = \"reservations\"\n", "");
    let err = load_isolated(&write_config(&dir, &content)).unwrap_err();
    assert!(err.to_string().contains("database.user"));
}

#[test]
fn static_token_debug_output_is_redacted() {
    let dir = TempDir::new().unwrap();
    let config = load_isolated(&write_config(&dir, STATIC_CONFIG)).unwrap();
    let rendered = format!("{:?}", config.auth.static_tokens);
    assert!(!rendered.contains("dev-token"));
}

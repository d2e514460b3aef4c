// crates/reservation-gate-config/src/config.rs
// ============================================================================
// Module: Reservation Gate Configuration
// Description: Configuration loading and validation for the reservation gate.
// Purpose: Provide strict, fail-closed config parsing with env overrides.
// Dependencies: serde, toml, url, reservation-gate-store-postgres
// ============================================================================

//! ## Overview
//! Configuration is loaded from `reservation-gate.toml` (or the path named by
//! `RESERVATION_GATE_CONFIG`), size-limited, parsed, overlaid with database
//! environment variables, then validated.
//!
//! ## Invariants
//! - Token-info verification requires at least one accepted audience.
//! - Static verification requires at least one token.
//! - Pool and database settings are validated before any pool exists.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use reservation_gate_core::Identity;
use reservation_gate_core::LatestLimit;
use reservation_gate_core::core::identifiers::DEFAULT_LATEST_LIMIT;
use reservation_gate_store_postgres::PoolConfig;
use reservation_gate_store_postgres::PostgresConnectionConfig;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "reservation-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "RESERVATION_GATE_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of static tokens.
const MAX_STATIC_TOKENS: usize = 64;
/// Maximum length of a static token.
const MAX_STATIC_TOKEN_LENGTH: usize = 256;
/// Maximum number of accepted audiences or issuers.
const MAX_CLAIM_VALUES: usize = 32;

/// Database user override.
pub const ENV_DB_USER: &str = "DB_USER";
/// Database password override.
pub const ENV_DB_PASSWORD: &str = "DB_PASSWORD";
/// Database name override.
pub const ENV_DB_NAME: &str = "DB_NAME";
/// Database host override.
pub const ENV_DB_HOST: &str = "DB_HOST";
/// Database port override.
pub const ENV_DB_PORT: &str = "DB_PORT";
/// Cloud SQL instance connection name override.
pub const ENV_CLOUD_SQL_INSTANCE: &str = "CLOUD_SQL_INSTANCE_CONNECTION_NAME";

/// Default token-info endpoint.
pub const DEFAULT_TOKEN_INFO_ENDPOINT: &str = "https://oauth2.googleapis.com/tokeninfo";

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Reservation gate configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReservationGateConfig {
    /// Database and pool settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Credential verification settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Tool behavior settings.
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl ReservationGateConfig {
    /// Loads configuration from disk using the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| env::var(key).ok())
    }

    /// Loads configuration from disk, resolving environment values through
    /// `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolved = resolve_path(path, &lookup)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.apply_env_overrides_from(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlays database settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an override is malformed.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides_from(|key| env::var(key).ok())
    }

    /// Overlays database settings resolved through `lookup`.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `DB_PORT` is not a port number.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let connection = &mut self.database.connection;
        if let Some(user) = present(ENV_DB_USER) {
            connection.user = user;
        }
        if let Some(password) = present(ENV_DB_PASSWORD) {
            connection.password = Some(password);
        }
        if let Some(dbname) = present(ENV_DB_NAME) {
            connection.dbname = dbname;
        }
        if let Some(host) = present(ENV_DB_HOST) {
            connection.host = host;
        }
        if let Some(port) = present(ENV_DB_PORT) {
            connection.port = port.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{ENV_DB_PORT} must be a port number"))
            })?;
        }
        if let Some(instance) = present(ENV_CLOUD_SQL_INSTANCE) {
            connection.instance_connection_name = Some(instance);
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.auth.validate()?;
        self.tools.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Database
// ============================================================================

/// Database connection and pool settings.
///
/// Connection fields sit directly under `[database]`; pool settings under
/// `[database.pool]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Connection coordinates.
    #[serde(flatten)]
    pub connection: PostgresConnectionConfig,
    /// Pool sizing and timeouts.
    #[serde(default)]
    pub pool: PoolConfig,
}

impl DatabaseConfig {
    /// Validates connection and pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when either section is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection.validate().map_err(|err| ConfigError::Invalid(err.to_string()))?;
        self.pool
            .validate()
            .map_err(|err| ConfigError::Invalid(format!("database.pool: {err}")))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Auth
// ============================================================================

/// Credential verification mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Verify tokens against an OAuth2 token-info endpoint.
    #[default]
    TokenInfo,
    /// Verify tokens against a fixed table (local development and tests).
    Static,
}

/// Credential verification settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Verification mode.
    #[serde(default)]
    pub mode: AuthMode,
    /// Overall verification budget in milliseconds.
    #[serde(default = "default_verify_timeout_ms")]
    pub verify_timeout_ms: u64,
    /// Token-info endpoint settings.
    #[serde(default)]
    pub token_info: TokenInfoConfig,
    /// Static token table.
    #[serde(default)]
    pub static_tokens: Vec<StaticTokenConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            verify_timeout_ms: default_verify_timeout_ms(),
            token_info: TokenInfoConfig::default(),
            static_tokens: Vec::new(),
        }
    }
}

impl AuthConfig {
    /// Validates the settings used by the selected mode.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the settings are unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.verify_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "auth.verify_timeout_ms must be greater than zero".to_string(),
            ));
        }
        match self.mode {
            AuthMode::TokenInfo => self.token_info.validate(),
            AuthMode::Static => validate_static_tokens(&self.static_tokens),
        }
    }
}

/// Token-info endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TokenInfoConfig {
    /// Token-info endpoint URL.
    #[serde(default = "default_token_info_endpoint")]
    pub endpoint: String,
    /// Accepted `aud` claim values (OAuth client ids).
    #[serde(default)]
    pub audiences: Vec<String>,
    /// Accepted `iss` claim values.
    #[serde(default = "default_issuers")]
    pub issuers: Vec<String>,
    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for TokenInfoConfig {
    fn default() -> Self {
        Self {
            endpoint: default_token_info_endpoint(),
            audiences: Vec::new(),
            issuers: default_issuers(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl TokenInfoConfig {
    /// Validates endpoint, audiences, and issuers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the settings are unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = Url::parse(&self.endpoint).map_err(|err| {
            ConfigError::Invalid(format!("auth.token_info.endpoint is not a url: {err}"))
        })?;
        let loopback = matches!(endpoint.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
        if endpoint.scheme() != "https" && !(endpoint.scheme() == "http" && loopback) {
            return Err(ConfigError::Invalid(
                "auth.token_info.endpoint must use https".to_string(),
            ));
        }
        validate_claim_values("auth.token_info.audiences", &self.audiences)?;
        validate_claim_values("auth.token_info.issuers", &self.issuers)?;
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "auth.token_info.request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fixed token to subject mapping.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StaticTokenConfig {
    /// Bearer token value.
    pub token: String,
    /// Subject the token verifies as.
    pub subject: String,
}

impl fmt::Debug for StaticTokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenConfig")
            .field("token", &"<redacted>")
            .field("subject", &self.subject)
            .finish()
    }
}

/// Validates a non-empty, bounded, duplicate-free list of claim values.
fn validate_claim_values(field: &str, values: &[String]) -> Result<(), ConfigError> {
    if values.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must not be empty")));
    }
    if values.len() > MAX_CLAIM_VALUES {
        return Err(ConfigError::Invalid(format!(
            "{field} must have at most {MAX_CLAIM_VALUES} entries"
        )));
    }
    let mut seen = BTreeSet::new();
    for value in values {
        if value.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{field} entries must be non-empty")));
        }
        if !seen.insert(value.as_str()) {
            return Err(ConfigError::Invalid(format!("{field} contains duplicate {value}")));
        }
    }
    Ok(())
}

/// Validates the static token table.
fn validate_static_tokens(tokens: &[StaticTokenConfig]) -> Result<(), ConfigError> {
    if tokens.is_empty() {
        return Err(ConfigError::Invalid(
            "auth.static_tokens must not be empty in static mode".to_string(),
        ));
    }
    if tokens.len() > MAX_STATIC_TOKENS {
        return Err(ConfigError::Invalid(format!(
            "auth.static_tokens must have at most {MAX_STATIC_TOKENS} entries"
        )));
    }
    let mut seen = BTreeSet::new();
    for entry in tokens {
        if entry.token.trim().is_empty() || entry.token.len() > MAX_STATIC_TOKEN_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "auth.static_tokens token must be 1..={MAX_STATIC_TOKEN_LENGTH} bytes"
            )));
        }
        Identity::from_verified_subject(entry.subject.as_str()).map_err(|err| {
            ConfigError::Invalid(format!("auth.static_tokens subject invalid: {err}"))
        })?;
        if !seen.insert(entry.token.as_str()) {
            return Err(ConfigError::Invalid(
                "auth.static_tokens contains duplicate token".to_string(),
            ));
        }
    }
    Ok(())
}

/// Default for [`AuthConfig::verify_timeout_ms`].
const fn default_verify_timeout_ms() -> u64 {
    10_000
}

/// Default for [`TokenInfoConfig::endpoint`].
fn default_token_info_endpoint() -> String {
    DEFAULT_TOKEN_INFO_ENDPOINT.to_string()
}

/// Default for [`TokenInfoConfig::issuers`].
fn default_issuers() -> Vec<String> {
    vec!["accounts.google.com".to_string(), "https://accounts.google.com".to_string()]
}

/// Default for [`TokenInfoConfig::request_timeout_ms`].
const fn default_request_timeout_ms() -> u64 {
    5_000
}

// ============================================================================
// SECTION: Tools
// ============================================================================

/// Tool behavior settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Rows returned by `getLatestReservations`.
    #[serde(default = "default_latest_limit")]
    pub latest_limit: u32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            latest_limit: default_latest_limit(),
        }
    }
}

impl ToolsConfig {
    /// Validates tool limits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `latest_limit` is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.latest().map(|_| ())
    }

    /// Returns the validated latest-reservations limit.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `latest_limit` is out of range.
    pub fn latest(&self) -> Result<LatestLimit, ConfigError> {
        LatestLimit::new(self.latest_limit)
            .map_err(|err| ConfigError::Invalid(format!("tools.latest_limit: {err}")))
    }
}

/// Default for [`ToolsConfig::latest_limit`].
const fn default_latest_limit() -> u32 {
    DEFAULT_LATEST_LIMIT
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the argument, environment, or default.
fn resolve_path<F>(path: Option<&Path>, lookup: &F) -> Result<PathBuf, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Some(env_path) = lookup(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

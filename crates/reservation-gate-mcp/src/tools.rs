// crates/reservation-gate-mcp/src/tools.rs
// ============================================================================
// Module: Reservation Tool Router
// Description: Tool routing for tenant-scoped reservation lookups.
// Purpose: Gate every tool call on session auth and shape stable responses.
// Dependencies: reservation-gate-core, reservation-gate-store-postgres, serde
// ============================================================================

//! ## Overview
//! The tool router is the boundary between an agent runtime and the
//! reservation repository. Each call runs the session interceptor first
//! ([`TokenValidator::validate_session`]), then dispatches to a handler that
//! reads identity from the session and declared arguments from the caller.
//! Security posture: declared arguments are untrusted and can never name or
//! override the identity a query is scoped to.
//!
//! ## Invariants
//! - Unauthenticated sessions never reach the repository or the pool.
//! - Argument decoding rejects unknown fields, including identity-like ones.
//! - Driver error text is logged, never returned to the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use reservation_gate_config::ReservationGateConfig;
use reservation_gate_core::IdentifierError;
use reservation_gate_core::Identity;
use reservation_gate_core::LatestLimit;
use reservation_gate_core::RepositoryError;
use reservation_gate_core::Reservation;
use reservation_gate_core::ReservationId;
use reservation_gate_core::SharedReservationRepository;
use reservation_gate_store_postgres::PooledReservationRepository;
use reservation_gate_store_postgres::postgres_pool_manager;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tracing::Instrument;

use crate::auth::TokenValidator;
use crate::session::AuthState;
use crate::session::SessionContext;
use crate::telemetry::NoopMetrics;
use crate::telemetry::ToolMetricEvent;
use crate::telemetry::ToolMetrics;
use crate::telemetry::ToolOutcome;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Message returned to unauthenticated sessions.
pub const AUTH_REQUIRED_MESSAGE: &str = "I can only look up reservations if you're logged in.";
/// Message returned when the reservation id argument is absent.
pub const MISSING_RESERVATION_ID_MESSAGE: &str = "Reservation ID was not provided.";
/// Longest rejected argument echoed back in validation messages.
const MAX_ECHOED_ARGUMENT_LENGTH: usize = 64;

// ============================================================================
// SECTION: Tool Names
// ============================================================================

/// Tools exposed to the agent runtime.
///
/// # Invariants
/// - Wire names are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ToolName {
    /// Single reservation lookup by id.
    #[serde(rename = "getReservationById")]
    GetReservationById,
    /// Most recent reservations for the session identity.
    #[serde(rename = "getLatestReservations")]
    GetLatestReservations,
}

impl ToolName {
    /// All tools in listing order.
    pub const ALL: [Self; 2] = [Self::GetReservationById, Self::GetLatestReservations];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetReservationById => "getReservationById",
            Self::GetLatestReservations => "getLatestReservations",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }
}

/// Tool definition advertised to the agent runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: ToolName,
    /// Tool description for the model.
    pub description: String,
    /// JSON schema for declared arguments.
    pub input_schema: Value,
}

// ============================================================================
// SECTION: Arguments
// ============================================================================

/// Declared arguments for `getReservationById`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetReservationByIdArgs {
    /// Reservation identifier as supplied by the caller.
    #[serde(default, alias = "reservationId")]
    reservation_id: Option<ReservationIdArg>,
}

/// Declared arguments for `getLatestReservations`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetLatestReservationsArgs {}

/// Caller-supplied reservation id before validation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReservationIdArg {
    /// JSON integer.
    Integer(i64),
    /// JSON string; must hold a base-10 integer.
    Text(String),
    /// Any other JSON value.
    Other(Value),
}

/// Validated reservation id together with the text the caller supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestedReservation {
    /// Parsed identifier used for the lookup.
    id: ReservationId,
    /// Caller's value as echoed in responses; trimmed for strings.
    echo: String,
}

impl ReservationIdArg {
    /// Validates the argument into a reservation id.
    fn resolve(self) -> Result<RequestedReservation, ToolError> {
        match self {
            Self::Integer(value) => Ok(RequestedReservation {
                id: ReservationId::from_raw(value),
                echo: value.to_string(),
            }),
            Self::Text(raw) => {
                let id = ReservationId::parse(&raw)?;
                Ok(RequestedReservation {
                    id,
                    echo: raw.trim().to_string(),
                })
            }
            Self::Other(value) => Err(invalid_format(&value.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Reservation as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationRecord {
    /// Reservation identifier.
    pub id: i64,
    /// Owning identity.
    pub user_id: String,
    /// Free-form details.
    pub details: String,
    /// Reservation date (RFC 3339).
    pub date: String,
}

impl From<&Reservation> for ReservationRecord {
    fn from(reservation: &Reservation) -> Self {
        Self {
            id: reservation.id.get(),
            user_id: reservation.owner.to_string(),
            details: reservation.details.clone(),
            date: reservation.date_rfc3339(),
        }
    }
}

/// Error classification for tool responses.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolErrorKind {
    /// Session is not authenticated.
    AuthRequired,
    /// Declared arguments are malformed.
    Validation,
    /// Tool name is not recognized.
    UnknownTool,
    /// Pool saturated with a full waiter queue.
    PoolExhausted,
    /// Connection acquisition timed out.
    PoolTimeout,
    /// Database or data integrity failure.
    Database,
}

impl ToolErrorKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthRequired => "auth_required",
            Self::Validation => "validation",
            Self::UnknownTool => "unknown_tool",
            Self::PoolExhausted => "pool_exhausted",
            Self::PoolTimeout => "pool_timeout",
            Self::Database => "database",
        }
    }
}

/// Tool response contract.
///
/// Serializes to exactly one of the documented shapes: a reservation object,
/// `{reservations}`, `{message}`, or `{error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ToolResponse {
    /// One reservation.
    Reservation(ReservationRecord),
    /// Latest reservations, newest first.
    Reservations {
        /// Reservation rows.
        reservations: Vec<ReservationRecord>,
    },
    /// Lookup by id matched nothing visible to the caller.
    NotFound {
        /// User-facing message.
        message: String,
    },
    /// Listing matched no rows.
    Empty {
        /// User-facing message.
        message: String,
    },
    /// Structured error.
    Error {
        /// User-facing message.
        error: String,
        /// Error classification (not serialized).
        #[serde(skip)]
        kind: ToolErrorKind,
    },
}

impl ToolResponse {
    /// Returns the error classification for error responses.
    #[must_use]
    pub const fn error_kind(&self) -> Option<ToolErrorKind> {
        match self {
            Self::Error {
                kind, ..
            } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true for error responses.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Returns the telemetry outcome for this response.
    #[must_use]
    pub const fn outcome(&self) -> ToolOutcome {
        match self {
            Self::Reservation(_) | Self::Reservations { .. } => ToolOutcome::Ok,
            Self::NotFound { .. } => ToolOutcome::NotFound,
            Self::Empty { .. } => ToolOutcome::Empty,
            Self::Error { .. } => ToolOutcome::Error,
        }
    }

    /// Renders the response as JSON.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "error": "serialization failure" }))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tool failures; display text is the user-facing message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    /// Session is not authenticated.
    #[error("{message}", message = AUTH_REQUIRED_MESSAGE)]
    AuthRequired,
    /// Declared arguments are malformed.
    #[error("{0}")]
    Validation(String),
    /// Tool name is not recognized.
    #[error("Unknown tool.")]
    UnknownTool,
    /// Pool saturated with a full waiter queue.
    #[error("The reservation service is busy. Please try again shortly.")]
    PoolExhausted,
    /// Connection acquisition timed out.
    #[error("Timed out waiting for a database connection. Please try again.")]
    PoolTimeout,
    /// Database failure; payload names what was being fetched.
    #[error("An error occurred while fetching {0}.")]
    Database(&'static str),
}

impl ToolError {
    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> ToolErrorKind {
        match self {
            Self::AuthRequired => ToolErrorKind::AuthRequired,
            Self::Validation(_) => ToolErrorKind::Validation,
            Self::UnknownTool => ToolErrorKind::UnknownTool,
            Self::PoolExhausted => ToolErrorKind::PoolExhausted,
            Self::PoolTimeout => ToolErrorKind::PoolTimeout,
            Self::Database(_) => ToolErrorKind::Database,
        }
    }
}

impl From<ToolError> for ToolResponse {
    fn from(err: ToolError) -> Self {
        Self::Error {
            kind: err.kind(),
            error: err.to_string(),
        }
    }
}

impl From<IdentifierError> for ToolError {
    fn from(err: IdentifierError) -> Self {
        match err {
            IdentifierError::MissingReservationId => {
                Self::Validation(MISSING_RESERVATION_ID_MESSAGE.to_string())
            }
            IdentifierError::MalformedReservationId(raw) => invalid_format(&raw),
            other => Self::Validation(other.to_string()),
        }
    }
}

/// Router construction failures.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Pool manager could not be created.
    #[error("connection pool setup failed: {0}")]
    Pool(String),
    /// Credential verifier could not be created.
    #[error("token verifier setup failed: {0}")]
    Verifier(String),
    /// Schema bootstrap failed.
    #[error("schema bootstrap failed: {0}")]
    Schema(String),
}

// ============================================================================
// SECTION: Tool Router
// ============================================================================

/// Tool router for reservation lookups.
#[derive(Clone)]
pub struct ToolRouter {
    /// Tenant-scoped repository.
    repository: SharedReservationRepository,
    /// Session validator run before every tool.
    validator: Arc<TokenValidator>,
    /// Invocation metrics sink.
    metrics: Arc<dyn ToolMetrics>,
    /// Row limit for latest lookups.
    latest_limit: LatestLimit,
}

/// Configuration inputs for building a tool router.
pub struct ToolRouterConfig {
    /// Tenant-scoped repository.
    pub repository: SharedReservationRepository,
    /// Session validator run before every tool.
    pub validator: Arc<TokenValidator>,
    /// Invocation metrics sink.
    pub metrics: Arc<dyn ToolMetrics>,
    /// Row limit for latest lookups.
    pub latest_limit: LatestLimit,
}

impl ToolRouter {
    /// Creates a new tool router.
    #[must_use]
    pub fn new(config: ToolRouterConfig) -> Self {
        Self {
            repository: config.repository,
            validator: config.validator,
            metrics: config.metrics,
            latest_limit: config.latest_limit,
        }
    }

    /// Builds a router over Postgres from loaded configuration.
    ///
    /// No database connection is opened unless `database.ensure_schema` is
    /// set; the pool is built on first use.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when configuration, pool, verifier, or schema
    /// setup fails.
    pub async fn from_config(config: &ReservationGateConfig) -> Result<Self, BuildError> {
        config.validate().map_err(|err| BuildError::Config(err.to_string()))?;
        let latest_limit =
            config.tools.latest().map_err(|err| BuildError::Config(err.to_string()))?;
        let pool = postgres_pool_manager(&config.database.connection, config.database.pool.clone())
            .map_err(|err| BuildError::Pool(err.to_string()))?;
        let repository = PooledReservationRepository::new(Arc::new(pool));
        if config.database.connection.ensure_schema {
            repository.ensure_schema().await.map_err(|err| BuildError::Schema(err.to_string()))?;
        }
        let validator = TokenValidator::from_config(&config.auth)?;
        Ok(Self::new(ToolRouterConfig {
            repository: Arc::new(repository),
            validator: Arc::new(validator),
            metrics: Arc::new(NoopMetrics),
            latest_limit,
        }))
    }

    /// Lists the tools supported by this router.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: ToolName::GetReservationById,
                description: "Fetches a specific reservation for the authenticated user using its \
                              unique reservation ID. Requires reservation_id as input."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "reservation_id": {
                            "type": ["string", "integer"],
                            "description": "Numeric reservation identifier."
                        }
                    },
                    "required": ["reservation_id"],
                    "additionalProperties": false
                }),
            },
            ToolDefinition {
                name: ToolName::GetLatestReservations,
                description: format!(
                    "Fetches the {} most recent reservations for the authenticated user, newest \
                     first.",
                    self.latest_limit.get()
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {},
                    "additionalProperties": false
                }),
            },
        ]
    }

    /// Invokes a tool by name for `session`.
    ///
    /// Never fails: every outcome, including auth and database failures, is
    /// a [`ToolResponse`].
    pub async fn invoke(
        &self,
        tool_name: &str,
        args: Value,
        session: &SessionContext,
    ) -> ToolResponse {
        let started = Instant::now();
        let tool = ToolName::parse(tool_name);
        let span = tracing::info_span!(
            "tool-invoke",
            tool = tool.map_or("unknown", ToolName::as_str),
            session_id = %session.session_id()
        );
        let response = self.dispatch(tool, args, session).instrument(span).await;
        let event = ToolMetricEvent {
            tool,
            outcome: response.outcome(),
            error_kind: response.error_kind(),
        };
        self.metrics.record_invocation(event);
        self.metrics.record_latency(event, started.elapsed());
        response
    }

    /// Runs the session interceptor, then the tool handler.
    async fn dispatch(
        &self,
        tool: Option<ToolName>,
        args: Value,
        session: &SessionContext,
    ) -> ToolResponse {
        let identity = match self.authenticate(session).await {
            Ok(identity) => identity,
            Err(err) => return err.into(),
        };
        let result = match tool {
            None => Err(ToolError::UnknownTool),
            Some(ToolName::GetReservationById) => self.get_reservation_by_id(&identity, args).await,
            Some(ToolName::GetLatestReservations) => {
                self.get_latest_reservations(&identity, args).await
            }
        };
        result.unwrap_or_else(ToolResponse::from)
    }

    /// Validates the session and returns its verified identity.
    async fn authenticate(&self, session: &SessionContext) -> Result<Identity, ToolError> {
        let state = self
            .validator
            .validate_session(session)
            .instrument(tracing::info_span!("validate-user-id"))
            .await;
        match state {
            AuthState::Authenticated(identity) => Ok(identity),
            AuthState::Unauthenticated(reason) => {
                tracing::info!(
                    reason = reason.as_str(),
                    "tool call refused: session not authenticated"
                );
                Err(ToolError::AuthRequired)
            }
        }
    }

    /// Handles `getReservationById`.
    async fn get_reservation_by_id(
        &self,
        identity: &Identity,
        args: Value,
    ) -> Result<ToolResponse, ToolError> {
        let request: GetReservationByIdArgs = decode(args)?;
        let requested = request
            .reservation_id
            .ok_or_else(|| ToolError::Validation(MISSING_RESERVATION_ID_MESSAGE.to_string()))?
            .resolve()?;
        let found = self
            .repository
            .get_by_id(identity, requested.id)
            .await
            .map_err(|err| repository_failure(ToolName::GetReservationById, &err))?;
        Ok(found.map_or_else(
            || ToolResponse::NotFound {
                message: format!("No reservation found with ID {} in your name.", requested.echo),
            },
            |reservation| ToolResponse::Reservation(ReservationRecord::from(&reservation)),
        ))
    }

    /// Handles `getLatestReservations`.
    async fn get_latest_reservations(
        &self,
        identity: &Identity,
        args: Value,
    ) -> Result<ToolResponse, ToolError> {
        let GetLatestReservationsArgs {} = decode(args)?;
        let rows = self
            .repository
            .get_latest(identity, self.latest_limit)
            .await
            .map_err(|err| repository_failure(ToolName::GetLatestReservations, &err))?;
        if rows.is_empty() {
            return Ok(ToolResponse::Empty {
                message: format!("No reservations found for user {identity}."),
            });
        }
        Ok(ToolResponse::Reservations {
            reservations: rows.iter().map(ReservationRecord::from).collect(),
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Decodes declared arguments; `null` is treated as an empty object.
fn decode<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|err| ToolError::Validation(format!("Invalid tool arguments: {err}.")))
}

/// Builds the validation error for a non-numeric reservation id.
fn invalid_format(raw: &str) -> ToolError {
    let shown = if raw.len() > MAX_ECHOED_ARGUMENT_LENGTH { "<too long>" } else { raw };
    ToolError::Validation(format!(
        "Invalid reservation ID format: {shown}. Expected an integer or numeric string."
    ))
}

/// Logs a repository failure and maps it to a user-safe error.
fn repository_failure(tool: ToolName, err: &RepositoryError) -> ToolError {
    let subject = match tool {
        ToolName::GetReservationById => "the reservation",
        ToolName::GetLatestReservations => "latest reservations",
    };
    match err {
        RepositoryError::PoolExhausted {
            ..
        } => {
            tracing::warn!(tool = tool.as_str(), error = %err, "connection pool exhausted");
            ToolError::PoolExhausted
        }
        RepositoryError::PoolTimeout {
            ..
        } => {
            tracing::warn!(tool = tool.as_str(), error = %err, "connection pool timeout");
            ToolError::PoolTimeout
        }
        RepositoryError::Database(_) | RepositoryError::Invalid(_) => {
            tracing::error!(tool = tool.as_str(), error = %err, "reservation query failed");
            ToolError::Database(subject)
        }
    }
}

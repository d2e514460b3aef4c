// crates/reservation-gate-mcp/src/lib.rs
// ============================================================================
// Module: Reservation Gate MCP
// Description: Authenticated tool surface over tenant-scoped reservations.
// Purpose: Bind verified identities to sessions and route agent tool calls.
// Dependencies: reservation-gate-core, reservation-gate-store-postgres, tokio
// ============================================================================

//! ## Overview
//! Reservation Gate MCP exposes reservation lookups as agent tools. A
//! [`SessionContext`] carries the caller's credential, [`TokenValidator`]
//! resolves it exactly once into a verified identity, and [`ToolRouter`]
//! gates every call on that identity before reaching the repository.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod observability;
pub mod session;
pub mod telemetry;
pub mod tools;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use auth::AuthAuditEvent;
pub use auth::AuthAuditSink;
pub use auth::HttpTokenVerifier;
pub use auth::NoopAuditSink;
pub use auth::StaticTokenVerifier;
pub use auth::TokenValidator;
pub use auth::TokenVerifier;
pub use auth::TracingAuditSink;
pub use auth::VerifiedToken;
pub use auth::VerifyError;
pub use observability::init_tracing;
pub use reservation_gate_config::ReservationGateConfig;
pub use session::AuthState;
pub use session::Credential;
pub use session::SessionContext;
pub use session::SessionError;
pub use session::SessionPhase;
pub use session::UnauthenticatedReason;
pub use telemetry::NoopMetrics;
pub use telemetry::ToolMetricEvent;
pub use telemetry::ToolMetrics;
pub use telemetry::ToolOutcome;
pub use tools::BuildError;
pub use tools::ReservationRecord;
pub use tools::ToolDefinition;
pub use tools::ToolError;
pub use tools::ToolErrorKind;
pub use tools::ToolName;
pub use tools::ToolResponse;
pub use tools::ToolRouter;
pub use tools::ToolRouterConfig;

// crates/reservation-gate-mcp/src/telemetry.rs
// ============================================================================
// Module: Tool Telemetry
// Description: Metric hooks for tool invocations.
// Purpose: Count invocation outcomes and latencies without a metrics backend.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A thin metrics interface for tool invocation counters and latencies.
//! Deployments plug in their own exporter behind [`ToolMetrics`]. Labels
//! never carry identities, credentials, or reservation contents.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Serialize;

use crate::tools::ToolErrorKind;
use crate::tools::ToolName;

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Tool invocation outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ToolOutcome {
    /// Data returned.
    Ok,
    /// Lookup by id matched nothing visible to the caller.
    NotFound,
    /// Listing returned no rows.
    Empty,
    /// Structured error returned.
    Error,
}

impl ToolOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NotFound => "not_found",
            Self::Empty => "empty",
            Self::Error => "error",
        }
    }
}

/// Tool invocation metric event payload.
///
/// # Invariants
/// - `tool` is `None` when the requested name is not a known tool.
/// - `error_kind` is `Some` exactly when `outcome` is [`ToolOutcome::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolMetricEvent {
    /// Invoked tool, when known.
    pub tool: Option<ToolName>,
    /// Invocation outcome.
    pub outcome: ToolOutcome,
    /// Error classification for failed invocations.
    pub error_kind: Option<ToolErrorKind>,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for tool invocations.
pub trait ToolMetrics: Send + Sync {
    /// Records an invocation counter event.
    fn record_invocation(&self, event: ToolMetricEvent);
    /// Records the invocation latency.
    fn record_latency(&self, event: ToolMetricEvent, latency: Duration);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are discarded.
pub struct NoopMetrics;

impl ToolMetrics for NoopMetrics {
    fn record_invocation(&self, _event: ToolMetricEvent) {}

    fn record_latency(&self, _event: ToolMetricEvent, _latency: Duration) {}
}

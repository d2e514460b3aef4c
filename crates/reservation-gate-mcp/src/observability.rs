// crates/reservation-gate-mcp/src/observability.rs
// ============================================================================
// Module: Observability
// Description: Process-wide tracing subscriber setup.
// Purpose: Route spans and events from every crate to one formatter.
// Dependencies: tracing-subscriber
// ============================================================================

//! ## Overview
//! Installs a `tracing-subscriber` registry once per process. The filter comes
//! from `RUST_LOG` (default `info`); output is compact text unless
//! `RESERVATION_GATE_LOG_FORMAT=json`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable selecting the log format.
pub const LOG_FORMAT_ENV_VAR: &str = "RESERVATION_GATE_LOG_FORMAT";

/// Outcome of the one-time subscriber installation.
static TRACING_INIT: OnceLock<bool> = OnceLock::new();

// ============================================================================
// SECTION: Initialization
// ============================================================================

/// Initializes the tracing subscriber once for the process.
///
/// Returns true when this crate's subscriber is the global default; false
/// when another subscriber was installed first. Later calls return the first
/// call's result.
pub fn init_tracing() -> bool {
    *TRACING_INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let json = std::env::var(LOG_FORMAT_ENV_VAR)
            .is_ok_and(|value| value.trim().eq_ignore_ascii_case("json"));
        let result = if json {
            tracing_subscriber::registry().with(env_filter).with(fmt::layer().json()).try_init()
        } else {
            tracing_subscriber::registry().with(env_filter).with(fmt::layer().compact()).try_init()
        };
        result.is_ok()
    })
}

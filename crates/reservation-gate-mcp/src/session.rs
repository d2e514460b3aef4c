// crates/reservation-gate-mcp/src/session.rs
// ============================================================================
// Module: Session Context
// Description: Per-conversation credential, auth outcome, and scratch state.
// Purpose: Bind a validated identity to a session so tools cannot forge it.
// Dependencies: reservation-gate-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! A [`SessionContext`] is created when a conversation starts, carrying the
//! raw credential (if any). Its authentication outcome lives in a write-once
//! cell that only [`crate::auth::TokenValidator`] can fill. Scratch state is
//! an open JSON map for non-security data; keys that name identity or
//! authentication state are refused so they can never be smuggled in.
//!
//! ## Invariants
//! - The auth outcome is set at most once and never changes afterwards.
//! - [`SessionContext::identity`] is `Some` only after successful validation.
//! - Scratch never holds reserved keys.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use reservation_gate_core::Identity;
use reservation_gate_core::hashing::sha256_hex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::OnceCell;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Scratch keys that name identity or authentication state.
pub const RESERVED_SCRATCH_KEYS: &[&str] = &[
    "user_id",
    "user_id_from_oauth",
    "user_token",
    "logged_in",
    "id_token_info",
    "identity",
    "authenticated",
];
/// Scratch key prefix reserved for persistent user state.
pub const RESERVED_SCRATCH_PREFIX: &str = "user:";
/// Maximum number of scratch entries per session.
pub const MAX_SCRATCH_ENTRIES: usize = 256;
/// Maximum scratch key length in bytes.
pub const MAX_SCRATCH_KEY_LENGTH: usize = 128;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Scratch state errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Key names identity or authentication state.
    #[error("scratch key {0} is reserved")]
    ReservedKey(String),
    /// Key is empty or too long.
    #[error("scratch key must be 1..={max} bytes", max = MAX_SCRATCH_KEY_LENGTH)]
    InvalidKey,
    /// Scratch map is full.
    #[error("scratch state exceeds {max} entries", max = MAX_SCRATCH_ENTRIES)]
    TooManyEntries,
}

// ============================================================================
// SECTION: Credential
// ============================================================================

/// Opaque bearer credential presented by the client.
///
/// Debug output is redacted; only the fingerprint is ever logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a raw credential, returning `None` when it is blank.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() { None } else { Some(Self(raw)) }
    }

    /// Returns the SHA-256 fingerprint used in audit records.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        sha256_hex(self.0.as_bytes())
    }

    /// Returns the raw credential for verification.
    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

// ============================================================================
// SECTION: Auth State
// ============================================================================

/// Why a session is unauthenticated.
///
/// # Invariants
/// - Variants are stable for audit and telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    /// No credential was presented.
    MissingCredential,
    /// The verifier rejected the credential or its claims.
    Rejected,
    /// The verifier could not be reached or failed.
    VerifierUnavailable,
    /// Verification exceeded its time budget.
    Timeout,
}

impl UnauthenticatedReason {
    /// Returns a stable label for the reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::Rejected => "rejected",
            Self::VerifierUnavailable => "verifier_unavailable",
            Self::Timeout => "timeout",
        }
    }
}

/// Terminal authentication outcome for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Credential verified; identity is the verified subject.
    Authenticated(Identity),
    /// Credential absent or not verified.
    Unauthenticated(UnauthenticatedReason),
}

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Validation has not completed yet.
    Unvalidated,
    /// Validation succeeded.
    Authenticated,
    /// Validation failed.
    Unauthenticated,
}

// ============================================================================
// SECTION: Session Context
// ============================================================================

/// Per-conversation state.
pub struct SessionContext {
    /// Session identifier used in logs and audit records.
    session_id: String,
    /// Raw credential, when presented.
    credential: Option<Credential>,
    /// Write-once authentication outcome.
    auth: OnceCell<AuthState>,
    /// Non-security scratch state.
    scratch: Mutex<BTreeMap<String, Value>>,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("credential", &self.credential)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    /// Creates a session with an optional raw credential.
    ///
    /// Blank credentials are treated as absent.
    #[must_use]
    pub fn new(session_id: impl Into<String>, credential: Option<String>) -> Self {
        Self {
            session_id: session_id.into(),
            credential: credential.and_then(Credential::new),
            auth: OnceCell::new(),
            scratch: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the presented credential.
    #[must_use]
    pub const fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Returns the authentication outcome, if validation has completed.
    #[must_use]
    pub fn auth_state(&self) -> Option<&AuthState> {
        self.auth.get()
    }

    /// Returns the lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        match self.auth.get() {
            None => SessionPhase::Unvalidated,
            Some(AuthState::Authenticated(_)) => SessionPhase::Authenticated,
            Some(AuthState::Unauthenticated(_)) => SessionPhase::Unauthenticated,
        }
    }

    /// Returns the verified identity.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self.auth.get() {
            Some(AuthState::Authenticated(identity)) => Some(identity),
            Some(AuthState::Unauthenticated(_)) | None => None,
        }
    }

    /// Returns true once validation succeeded.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity().is_some()
    }

    /// Resolves the auth outcome, running `init` only if none is set.
    ///
    /// Concurrent callers wait on the same initialization.
    pub(crate) async fn resolve_auth<F, Fut>(&self, init: F) -> &AuthState
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AuthState>,
    {
        self.auth.get_or_init(init).await
    }

    /// Stores a scratch value, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the key is reserved, malformed, or the
    /// map is full.
    pub fn scratch_insert(
        &self,
        key: impl Into<String>,
        value: Value,
    ) -> Result<Option<Value>, SessionError> {
        let key = key.into();
        if key.is_empty() || key.len() > MAX_SCRATCH_KEY_LENGTH {
            return Err(SessionError::InvalidKey);
        }
        if is_reserved_scratch_key(&key) {
            return Err(SessionError::ReservedKey(key));
        }
        let mut scratch = self.lock_scratch();
        if !scratch.contains_key(&key) && scratch.len() >= MAX_SCRATCH_ENTRIES {
            return Err(SessionError::TooManyEntries);
        }
        Ok(scratch.insert(key, value))
    }

    /// Returns a scratch value.
    #[must_use]
    pub fn scratch_get(&self, key: &str) -> Option<Value> {
        self.lock_scratch().get(key).cloned()
    }

    /// Removes a scratch value.
    pub fn scratch_remove(&self, key: &str) -> Option<Value> {
        self.lock_scratch().remove(key)
    }

    /// Returns a copy of all scratch state.
    #[must_use]
    pub fn scratch_snapshot(&self) -> BTreeMap<String, Value> {
        self.lock_scratch().clone()
    }

    /// Locks scratch state, recovering from poisoning.
    fn lock_scratch(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.scratch.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns true when `key` names identity or authentication state.
///
/// Matching is ASCII case-insensitive and ignores surrounding whitespace.
#[must_use]
pub fn is_reserved_scratch_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    normalized.starts_with(RESERVED_SCRATCH_PREFIX)
        || RESERVED_SCRATCH_KEYS.contains(&normalized.as_str())
}

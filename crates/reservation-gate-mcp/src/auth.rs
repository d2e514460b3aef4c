// crates/reservation-gate-mcp/src/auth.rs
// ============================================================================
// Module: Session Authentication
// Description: Credential verification and one-shot session validation.
// Purpose: Derive a server-trusted identity from a presented credential.
// Dependencies: reqwest, reservation-gate-config, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! [`TokenValidator`] turns a session's raw credential into a terminal
//! [`AuthState`]. Verification is delegated to a blocking [`TokenVerifier`]
//! run on a `tokio` blocking worker under a time budget, so a slow identity
//! provider never stalls other invocations. Every decision emits an
//! [`AuthAuditEvent`].
//!
//! All failures are fail-closed: the session becomes unauthenticated and no
//! error escapes to the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reservation_gate_config::AuthConfig;
use reservation_gate_config::AuthMode;
use reservation_gate_config::StaticTokenConfig;
use reservation_gate_config::TokenInfoConfig;
use reservation_gate_core::Identity;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;
use url::form_urlencoded;

use crate::session::AuthState;
use crate::session::Credential;
use crate::session::SessionContext;
use crate::session::UnauthenticatedReason;
use crate::tools::BuildError;

// ============================================================================
// SECTION: Verifier Interface
// ============================================================================

/// Claims accepted from a verified credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    /// Verified subject (`sub` claim).
    pub subject: String,
}

/// Credential verification failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// Credential is invalid, expired, or carries unaccepted claims.
    #[error("credential rejected: {0}")]
    Rejected(String),
    /// Verifier could not produce a decision.
    #[error("verifier unavailable: {0}")]
    Unavailable(String),
}

/// Blocking credential verifier.
///
/// Implementations may perform network I/O; callers run them on blocking
/// workers.
pub trait TokenVerifier: Send + Sync {
    /// Verifies `token` and returns its accepted claims.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError`] when the token is not accepted.
    fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError>;
}

// ============================================================================
// SECTION: Token-Info Verifier
// ============================================================================

/// Verifies ID tokens against an OAuth2 token-info endpoint.
///
/// # Invariants
/// - `aud` must be one of the configured audiences; an empty list accepts
///   nothing.
/// - `iss` must be one of the configured issuers.
/// - `exp` must lie in the future.
pub struct HttpTokenVerifier {
    /// Token-info endpoint.
    endpoint: Url,
    /// Accepted audiences.
    audiences: BTreeSet<String>,
    /// Accepted issuers.
    issuers: BTreeSet<String>,
    /// HTTP request timeout.
    request_timeout: Duration,
    /// Lazily built blocking client.
    client: OnceLock<Client>,
}

impl HttpTokenVerifier {
    /// Builds a verifier from token-info settings.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Verifier`] when the endpoint is not a URL.
    pub fn from_config(config: &TokenInfoConfig) -> Result<Self, BuildError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|err| BuildError::Verifier(format!("invalid token-info endpoint: {err}")))?;
        Ok(Self {
            endpoint,
            audiences: config.audiences.iter().cloned().collect(),
            issuers: config.issuers.iter().cloned().collect(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            client: OnceLock::new(),
        })
    }

    /// Returns the blocking client, building it on first use.
    ///
    /// The client is built inside the blocking worker because the blocking
    /// client must not be constructed on an async runtime thread.
    fn client(&self) -> Result<&Client, VerifyError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let built = Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|err| VerifyError::Unavailable(err.to_string()))?;
        Ok(self.client.get_or_init(|| built))
    }
}

impl TokenVerifier for HttpTokenVerifier {
    fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError> {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("id_token", token)
            .finish();
        let response = self
            .client()?
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .map_err(|err| VerifyError::Unavailable(err.to_string()))?;
        let status = response.status();
        if status.is_server_error() {
            return Err(VerifyError::Unavailable(format!("token-info returned {status}")));
        }
        if !status.is_success() {
            return Err(VerifyError::Rejected(format!("token-info returned {status}")));
        }
        let claims: Value = response
            .json()
            .map_err(|_| VerifyError::Rejected("malformed token-info response".to_string()))?;
        check_claims(&claims, &self.audiences, &self.issuers, OffsetDateTime::now_utc())
    }
}

/// Checks token-info claims against the accepted audiences and issuers.
///
/// # Errors
///
/// Returns [`VerifyError::Rejected`] naming the first failing claim.
pub fn check_claims(
    claims: &Value,
    audiences: &BTreeSet<String>,
    issuers: &BTreeSet<String>,
    now: OffsetDateTime,
) -> Result<VerifiedToken, VerifyError> {
    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .filter(|sub| !sub.trim().is_empty())
        .ok_or_else(|| VerifyError::Rejected("missing sub claim".to_string()))?;
    let audience = claims.get("aud").and_then(Value::as_str).unwrap_or_default();
    if !audiences.contains(audience) {
        return Err(VerifyError::Rejected("audience not accepted".to_string()));
    }
    let issuer = claims.get("iss").and_then(Value::as_str).unwrap_or_default();
    if !issuers.contains(issuer) {
        return Err(VerifyError::Rejected("issuer not accepted".to_string()));
    }
    let expires_at = claims
        .get("exp")
        .and_then(|exp| exp.as_i64().or_else(|| exp.as_str().and_then(|raw| raw.parse().ok())))
        .ok_or_else(|| VerifyError::Rejected("missing exp claim".to_string()))?;
    if expires_at <= now.unix_timestamp() {
        return Err(VerifyError::Rejected("token expired".to_string()));
    }
    Ok(VerifiedToken {
        subject: subject.to_string(),
    })
}

// ============================================================================
// SECTION: Static Verifier
// ============================================================================

/// Verifies tokens against a fixed token to subject table.
pub struct StaticTokenVerifier {
    /// Token to subject mapping.
    tokens: BTreeMap<String, String>,
}

impl StaticTokenVerifier {
    /// Builds a verifier from configured static tokens.
    #[must_use]
    pub fn from_config(tokens: &[StaticTokenConfig]) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|entry| (entry.token.clone(), entry.subject.clone()))
                .collect(),
        }
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError> {
        self.tokens
            .get(token)
            .map(|subject| VerifiedToken {
                subject: subject.clone(),
            })
            .ok_or_else(|| VerifyError::Rejected("unknown token".to_string()))
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Session authentication audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthAuditEvent {
    /// Event identifier.
    event: &'static str,
    /// Decision outcome.
    decision: &'static str,
    /// Session identifier.
    session_id: String,
    /// Verified subject (allow events).
    subject: Option<String>,
    /// Credential fingerprint (sha256).
    credential_fingerprint: Option<String>,
    /// Failure reason label (deny events).
    reason: Option<&'static str>,
}

impl AuthAuditEvent {
    /// Builds an allow event.
    #[must_use]
    pub fn allowed(session: &SessionContext, identity: &Identity) -> Self {
        Self {
            event: "session_auth",
            decision: "allow",
            session_id: session.session_id().to_string(),
            subject: Some(identity.to_string()),
            credential_fingerprint: session.credential().map(Credential::fingerprint),
            reason: None,
        }
    }

    /// Builds a deny event.
    #[must_use]
    pub fn denied(session: &SessionContext, reason: UnauthenticatedReason) -> Self {
        Self {
            event: "session_auth",
            decision: "deny",
            session_id: session.session_id().to_string(),
            subject: None,
            credential_fingerprint: session.credential().map(Credential::fingerprint),
            reason: Some(reason.as_str()),
        }
    }

    /// Returns the decision label (`allow` or `deny`).
    #[must_use]
    pub const fn decision(&self) -> &'static str {
        self.decision
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the verified subject for allow events.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Returns the credential fingerprint, when a credential was presented.
    #[must_use]
    pub fn credential_fingerprint(&self) -> Option<&str> {
        self.credential_fingerprint.as_deref()
    }

    /// Returns the failure reason label for deny events.
    #[must_use]
    pub const fn reason(&self) -> Option<&'static str> {
        self.reason
    }
}

/// Audit sink for session authentication decisions.
pub trait AuthAuditSink: Send + Sync {
    /// Records an auth audit event.
    fn record(&self, event: &AuthAuditEvent);
}

/// Audit sink that emits events through `tracing`.
pub struct TracingAuditSink;

impl AuthAuditSink for TracingAuditSink {
    fn record(&self, event: &AuthAuditEvent) {
        tracing::info!(
            target: "reservation_gate::audit",
            event = event.event,
            decision = event.decision,
            session_id = %event.session_id,
            subject = event.subject(),
            credential_fingerprint = event.credential_fingerprint(),
            reason = event.reason,
            "session auth decision"
        );
    }
}

/// No-op audit sink for tests.
pub struct NoopAuditSink;

impl AuthAuditSink for NoopAuditSink {
    fn record(&self, _event: &AuthAuditEvent) {}
}

// ============================================================================
// SECTION: Token Validator
// ============================================================================

/// Validates session credentials exactly once per session.
pub struct TokenValidator {
    /// Credential verifier.
    verifier: Arc<dyn TokenVerifier>,
    /// Audit sink.
    audit: Arc<dyn AuthAuditSink>,
    /// Verification time budget.
    verify_timeout: Duration,
}

impl TokenValidator {
    /// Creates a validator.
    #[must_use]
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        audit: Arc<dyn AuthAuditSink>,
        verify_timeout: Duration,
    ) -> Self {
        Self {
            verifier,
            audit,
            verify_timeout,
        }
    }

    /// Builds a validator from auth settings with a tracing audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when the verifier cannot be built.
    pub fn from_config(config: &AuthConfig) -> Result<Self, BuildError> {
        config.validate().map_err(|err| BuildError::Config(err.to_string()))?;
        let verifier: Arc<dyn TokenVerifier> = match config.mode {
            AuthMode::TokenInfo => Arc::new(HttpTokenVerifier::from_config(&config.token_info)?),
            AuthMode::Static => Arc::new(StaticTokenVerifier::from_config(&config.static_tokens)),
        };
        Ok(Self::new(
            verifier,
            Arc::new(TracingAuditSink),
            Duration::from_millis(config.verify_timeout_ms),
        ))
    }

    /// Verifies a credential without touching any session.
    ///
    /// An absent credential is unauthenticated without calling the verifier.
    pub async fn verify_credential(&self, credential: Option<&Credential>) -> AuthState {
        let Some(credential) = credential else {
            return AuthState::Unauthenticated(UnauthenticatedReason::MissingCredential);
        };
        let verifier = Arc::clone(&self.verifier);
        let token = credential.expose().to_string();
        let handle = tokio::task::spawn_blocking(move || verifier.verify(&token));
        let verified = match tokio::time::timeout(self.verify_timeout, handle).await {
            Ok(Ok(Ok(verified))) => verified,
            Ok(Ok(Err(VerifyError::Rejected(detail)))) => {
                tracing::info!(reason = %detail, "credential rejected");
                return AuthState::Unauthenticated(UnauthenticatedReason::Rejected);
            }
            Ok(Ok(Err(VerifyError::Unavailable(detail)))) => {
                tracing::warn!(reason = %detail, "credential verifier unavailable");
                return AuthState::Unauthenticated(UnauthenticatedReason::VerifierUnavailable);
            }
            Ok(Err(err)) => {
                tracing::error!(error = %err, "credential verifier worker failed");
                return AuthState::Unauthenticated(UnauthenticatedReason::VerifierUnavailable);
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = u64::try_from(self.verify_timeout.as_millis()).unwrap_or(u64::MAX),
                    "credential verification timed out"
                );
                return AuthState::Unauthenticated(UnauthenticatedReason::Timeout);
            }
        };
        match Identity::from_verified_subject(verified.subject) {
            Ok(identity) => AuthState::Authenticated(identity),
            Err(err) => {
                tracing::info!(reason = %err, "verified subject is not a valid identity");
                AuthState::Unauthenticated(UnauthenticatedReason::Rejected)
            }
        }
    }

    /// Validates `session` once and returns its terminal auth state.
    ///
    /// The first call verifies and records the outcome; later and concurrent
    /// calls observe the same outcome without re-verifying.
    pub async fn validate_session(&self, session: &SessionContext) -> AuthState {
        session
            .resolve_auth(|| async {
                let state = self.verify_credential(session.credential()).await;
                let event = match &state {
                    AuthState::Authenticated(identity) => {
                        AuthAuditEvent::allowed(session, identity)
                    }
                    AuthState::Unauthenticated(reason) => AuthAuditEvent::denied(session, *reason),
                };
                self.audit.record(&event);
                state
            })
            .await
            .clone()
    }
}

#[cfg(test)]
mod tests;

// crates/reservation-gate-mcp/src/auth/tests.rs
// ============================================================================
// Module: Session Authentication Unit Tests
// Description: Unit tests for claim checks and one-shot session validation.
// Purpose: Ensure credentials are verified fail-closed and exactly once.
// Dependencies: reservation-gate-mcp, serde_json, tokio
// ============================================================================

//! ## Overview
//! Covers token-info claim validation, the static verifier, and the
//! validator's timeout and write-once behavior.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::use_debug,
    reason = "Test-only assertions favor direct unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use reservation_gate_config::StaticTokenConfig;
use serde_json::json;
use time::OffsetDateTime;

use super::AuthAuditEvent;
use super::AuthAuditSink;
use super::NoopAuditSink;
use super::StaticTokenVerifier;
use super::TokenValidator;
use super::TokenVerifier;
use super::VerifiedToken;
use super::VerifyError;
use super::check_claims;
use crate::session::AuthState;
use crate::session::SessionContext;
use crate::session::SessionPhase;
use crate::session::UnauthenticatedReason;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Fixed evaluation instant for claim checks.
fn now() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
}

/// Accepted audience set.
fn audiences() -> BTreeSet<String> {
    BTreeSet::from(["client-123".to_string()])
}

/// Accepted issuer set.
fn issuers() -> BTreeSet<String> {
    BTreeSet::from(["accounts.google.com".to_string(), "https://accounts.google.com".to_string()])
}

/// Verifier that counts calls and optionally sleeps before answering.
struct CountingVerifier {
    /// Number of verify calls.
    calls: AtomicUsize,
    /// Delay applied to every call.
    delay: Duration,
    /// Result returned by every call.
    outcome: Result<VerifiedToken, VerifyError>,
}

impl CountingVerifier {
    fn accepting(subject: &str, delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            outcome: Ok(VerifiedToken {
                subject: subject.to_string(),
            }),
        }
    }

    fn failing(err: VerifyError) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            outcome: Err(err),
        }
    }
}

impl TokenVerifier for CountingVerifier {
    fn verify(&self, _token: &str) -> Result<VerifiedToken, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        match &self.outcome {
            Ok(token) => Ok(token.clone()),
            Err(VerifyError::Rejected(detail)) => Err(VerifyError::Rejected(detail.clone())),
            Err(VerifyError::Unavailable(detail)) => Err(VerifyError::Unavailable(detail.clone())),
        }
    }
}

/// Verifier whose latency depends on the presented token.
struct KeyedDelayVerifier {
    /// Token that is answered slowly.
    slow_token: &'static str,
    /// Delay applied to the slow token.
    delay: Duration,
}

impl TokenVerifier for KeyedDelayVerifier {
    fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError> {
        if token == self.slow_token {
            std::thread::sleep(self.delay);
        }
        Ok(VerifiedToken {
            subject: format!("user_{token}"),
        })
    }
}

/// Audit sink that keeps every event.
#[derive(Default)]
struct RecordingAudit {
    /// Recorded events.
    events: Mutex<Vec<AuthAuditEvent>>,
}

impl AuthAuditSink for RecordingAudit {
    fn record(&self, event: &AuthAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn validator(verifier: Arc<dyn TokenVerifier>, timeout: Duration) -> TokenValidator {
    TokenValidator::new(verifier, Arc::new(NoopAuditSink), timeout)
}

// ============================================================================
// SECTION: Claim Checks
// ============================================================================

#[test]
fn valid_claims_yield_subject() {
    let claims = json!({
        "sub": "user_123",
        "aud": "client-123",
        "iss": "https://accounts.google.com",
        "exp": "1700003600"
    });
    let token = check_claims(&claims, &audiences(), &issuers(), now()).unwrap();
    assert_eq!(token.subject, "user_123");
}

#[test]
fn numeric_exp_is_accepted() {
    let claims = json!({
        "sub": "user_123",
        "aud": "client-123",
        "iss": "accounts.google.com",
        "exp": 1_700_000_001_i64
    });
    assert!(check_claims(&claims, &audiences(), &issuers(), now()).is_ok());
}

#[test]
fn claim_failures_are_rejected() {
    let base = json!({
        "sub": "user_123",
        "aud": "client-123",
        "iss": "accounts.google.com",
        "exp": 1_700_003_600_i64
    });
    let cases = [
        ("sub", json!(""), "sub"),
        ("sub", json!("   "), "sub"),
        ("aud", json!("other-client"), "audience"),
        ("iss", json!("evil.example.com"), "issuer"),
        ("exp", json!(1_700_000_000_i64), "expired"),
        ("exp", json!("soon"), "exp"),
    ];
    for (field, value, needle) in cases {
        let mut claims = base.clone();
        claims[field] = value;
        match check_claims(&claims, &audiences(), &issuers(), now()) {
            Err(VerifyError::Rejected(detail)) => assert!(detail.contains(needle), "{detail}"),
            other => panic!("expected rejection for {field}, got {other:?}"),
        }
    }
}

#[test]
fn empty_audience_set_accepts_nothing() {
    let claims = json!({
        "sub": "user_123",
        "aud": "",
        "iss": "accounts.google.com",
        "exp": 1_700_003_600_i64
    });
    assert!(check_claims(&claims, &BTreeSet::new(), &issuers(), now()).is_err());
}

#[test]
fn static_verifier_maps_known_tokens() {
    let verifier = StaticTokenVerifier::from_config(&[StaticTokenConfig {
        token: "dev-token".to_string(),
        subject: "user_123".to_string(),
    }]);
    assert_eq!(verifier.verify("dev-token").unwrap().subject, "user_123");
    assert!(matches!(verifier.verify("other"), Err(VerifyError::Rejected(_))));
}

// ============================================================================
// SECTION: Validator
// ============================================================================

#[tokio::test]
async fn missing_credential_skips_verifier() {
    let verifier = Arc::new(CountingVerifier::accepting("user_123", Duration::ZERO));
    let validator = validator(verifier.clone(), Duration::from_secs(1));
    let session = SessionContext::new("s", None);

    let state = validator.validate_session(&session).await;
    assert_eq!(state, AuthState::Unauthenticated(UnauthenticatedReason::MissingCredential));
    assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    assert_eq!(session.phase(), SessionPhase::Unauthenticated);
}

#[tokio::test]
async fn verifier_outcomes_map_to_reasons() {
    let cases = [
        (VerifyError::Rejected("bad".to_string()), UnauthenticatedReason::Rejected),
        (VerifyError::Unavailable("down".to_string()), UnauthenticatedReason::VerifierUnavailable),
    ];
    for (err, reason) in cases {
        let validator = validator(Arc::new(CountingVerifier::failing(err)), Duration::from_secs(1));
        let session = SessionContext::new("s", Some("token".to_string()));
        assert_eq!(validator.validate_session(&session).await, AuthState::Unauthenticated(reason));
        assert!(session.identity().is_none());
    }
}

#[tokio::test]
async fn slow_verifier_times_out_unauthenticated() {
    let verifier = Arc::new(CountingVerifier::accepting("user_123", Duration::from_millis(500)));
    let validator = validator(verifier, Duration::from_millis(20));
    let session = SessionContext::new("s", Some("token".to_string()));

    let state = validator.validate_session(&session).await;
    assert_eq!(state, AuthState::Unauthenticated(UnauthenticatedReason::Timeout));
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn invalid_subject_is_rejected() {
    let verifier = Arc::new(CountingVerifier::accepting("   ", Duration::ZERO));
    let validator = validator(verifier, Duration::from_secs(1));
    let session = SessionContext::new("s", Some("token".to_string()));
    assert_eq!(
        validator.validate_session(&session).await,
        AuthState::Unauthenticated(UnauthenticatedReason::Rejected)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_validation_verifies_once() {
    let verifier = Arc::new(CountingVerifier::accepting("user_123", Duration::from_millis(30)));
    let audit = Arc::new(RecordingAudit::default());
    let validator =
        Arc::new(TokenValidator::new(verifier.clone(), audit.clone(), Duration::from_secs(2)));
    let session = Arc::new(SessionContext::new("session-7", Some("token".to_string())));

    let mut handles = Vec::new();
    for _ in 0 .. 16 {
        let validator = Arc::clone(&validator);
        let session = Arc::clone(&session);
        handles.push(tokio::spawn(async move { validator.validate_session(&session).await }));
    }
    for handle in handles {
        let state = handle.await.unwrap();
        assert!(matches!(state, AuthState::Authenticated(ref id) if id.as_str() == "user_123"));
    }

    assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
    let events = audit.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].decision(), "allow");
    assert_eq!(events[0].session_id(), "session-7");
    assert_eq!(events[0].subject(), Some("user_123"));
    assert!(events[0].credential_fingerprint().is_some());
    assert_eq!(events[0].reason(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_verification_does_not_block_other_sessions() {
    let verifier = Arc::new(KeyedDelayVerifier {
        slow_token: "slow",
        delay: Duration::from_millis(500),
    });
    let validator = Arc::new(validator(verifier, Duration::from_secs(2)));
    let slow_session = Arc::new(SessionContext::new("slow-session", Some("slow".to_string())));

    let slow = {
        let validator = Arc::clone(&validator);
        let session = Arc::clone(&slow_session);
        tokio::spawn(async move { validator.validate_session(&session).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(slow_session.phase(), SessionPhase::Unvalidated);

    let started = Instant::now();
    let fast_session = SessionContext::new("fast-session", Some("fast".to_string()));
    let state = validator.validate_session(&fast_session).await;
    let elapsed = started.elapsed();
    assert!(matches!(state, AuthState::Authenticated(ref id) if id.as_str() == "user_fast"));
    assert!(elapsed < Duration::from_millis(250), "fast session waited {elapsed:?}");

    let state = slow.await.unwrap();
    assert!(matches!(state, AuthState::Authenticated(ref id) if id.as_str() == "user_slow"));
}

#[tokio::test]
async fn denied_audit_carries_reason_without_subject() {
    let audit = Arc::new(RecordingAudit::default());
    let validator = TokenValidator::new(
        Arc::new(CountingVerifier::failing(VerifyError::Rejected("bad".to_string()))),
        audit.clone(),
        Duration::from_secs(1),
    );
    let session = SessionContext::new("s", Some("token".to_string()));
    validator.validate_session(&session).await;

    let events = audit.events.lock().unwrap();
    assert_eq!(events[0].decision(), "deny");
    assert_eq!(events[0].reason(), Some("rejected"));
    assert_eq!(events[0].subject(), None);
}

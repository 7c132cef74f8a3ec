//! Audit logging.
//!
//! Security-relevant outcomes (validation failures, replays, unsigned token
//! acceptance, issuance) are emitted as [`AuditEvent`]s to an injected
//! [`AuditLogger`]. Events never carry raw token text or key material: tokens
//! are identified by a truncated SHA-256 fingerprint.

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Types of token lifecycle events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A token passed every check
    TokenValidated,
    /// A token was rejected
    ValidationFailed,
    /// A token was rejected because it had been seen before
    ReplayDetected,
    /// An `alg: none` token was accepted under an explicit opt-in
    UnsignedTokenAccepted,
    /// A token was issued
    TokenIssued,
}

/// A single audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: String,

    pub event_type: AuditEventType,

    pub timestamp: DateTime<Utc>,

    /// Truncated SHA-256 of the token text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_fingerprint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Key id of the signing or verifying key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    /// Kebab-case failure kind, for failure events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            id: format!("evt_{}", uuid::Uuid::now_v7().simple()),
            event_type,
            timestamp: Utc::now(),
            token_fingerprint: None,
            issuer: None,
            subject: None,
            key_id: None,
            error_kind: None,
            details: None,
        }
    }

    /// Stamp the event with the handler's clock instead of wall time.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Identify the token by digest (see [`crate::crypto::token_digest`]).
    pub fn with_token_digest(mut self, digest: &str) -> Self {
        self.token_fingerprint = Some(digest.chars().take(16).collect());
        self
    }

    pub fn with_issuer(mut self, issuer: Option<&str>) -> Self {
        self.issuer = issuer.map(str::to_string);
        self
    }

    pub fn with_subject(mut self, subject: Option<&str>) -> Self {
        self.subject = subject.map(str::to_string);
        self
    }

    pub fn with_key_id(mut self, key_id: Option<&str>) -> Self {
        self.key_id = key_id.map(str::to_string);
        self
    }

    /// Attach the failure kind and message.
    pub fn with_error(mut self, error: &Error) -> Self {
        self.error_kind = Some(error.kind().name().to_string());
        self.details = Some(error.to_string());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Trait for audit loggers.
pub trait AuditLogger: Send + Sync + std::fmt::Debug {
    /// Log an audit event.
    fn log(&self, event: AuditEvent);
}

pub type SharedAuditLogger = Arc<dyn AuditLogger>;

/// Writes events to stdout as JSON lines.
#[derive(Debug, Default)]
pub struct StdoutLogger;

impl StdoutLogger {
    pub fn new() -> Self {
        Self
    }
}

impl AuditLogger for StdoutLogger {
    fn log(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => println!("{}", json),
            Err(e) => tracing::warn!(error = %e, event_id = %event.id, "failed to serialize audit event"),
        }
    }
}

/// A logger that does nothing.
#[derive(Debug, Default)]
pub struct NoOpLogger;

impl AuditLogger for NoOpLogger {
    fn log(&self, _event: AuditEvent) {}
}

/// Keeps events in memory. Intended for tests and embedded inspection.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, event_type: AuditEventType) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl AuditLogger for MemoryLogger {
    fn log(&self, event: AuditEvent) {
        // A panic elsewhere must not hide later events.
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::token_digest;

    #[test]
    fn test_event_serialization_skips_empty_fields() {
        let event = AuditEvent::new(AuditEventType::TokenIssued).with_key_id(Some("k1"));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"token_issued\""));
        assert!(json.contains("\"key_id\":\"k1\""));
        assert!(!json.contains("issuer"));
        assert!(event.id.starts_with("evt_"));
    }

    #[test]
    fn test_event_carries_fingerprint_not_token() {
        let raw = "eyJhbGciOiJIUzI1NiJ9.e30.sig";
        let event = AuditEvent::new(AuditEventType::ReplayDetected)
            .with_token_digest(&token_digest(raw))
            .with_error(&Error::TokenReplayDetected);
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains(raw));
        assert_eq!(event.token_fingerprint.as_deref().map(str::len), Some(16));
        assert_eq!(event.error_kind.as_deref(), Some("token-replay-detected"));
    }

    #[test]
    fn test_memory_logger_counts() {
        let logger = MemoryLogger::new();
        logger.log(AuditEvent::new(AuditEventType::TokenValidated));
        logger.log(AuditEvent::new(AuditEventType::ValidationFailed));
        logger.log(AuditEvent::new(AuditEventType::ValidationFailed));
        assert_eq!(logger.count(AuditEventType::ValidationFailed), 2);
        assert_eq!(logger.events().len(), 3);
    }

    #[test]
    fn test_memory_logger_survives_poisoned_lock() {
        let logger = Arc::new(MemoryLogger::new());
        logger.log(AuditEvent::new(AuditEventType::TokenIssued));

        let holder = Arc::clone(&logger);
        let panicked = std::thread::spawn(move || {
            let _guard = holder.events.lock().unwrap();
            panic!("audit consumer failed");
        })
        .join();
        assert!(panicked.is_err());
        assert!(logger.events.is_poisoned());

        logger.log(AuditEvent::new(AuditEventType::TokenValidated));
        assert_eq!(logger.events().len(), 2);
        assert_eq!(logger.count(AuditEventType::TokenValidated), 1);
    }
}

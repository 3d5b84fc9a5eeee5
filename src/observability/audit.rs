/// Execution audit trail
///
/// One JSON object per lifecycle event, written through the `log` facade on
/// the `coderun::audit` target so operators can route it separately with
/// `RUST_LOG=coderun::audit=info`. Source text and stdin never appear in an
/// event; sources are identified by their SHA-256 fingerprint.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const AUDIT_TARGET: &str = "coderun::audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    ExecutionStart,
    PhaseFinished,
    ForcedKill,
    CleanupFailure,
    SessionStart,
    ExecutionEnd,
}

impl AuditEventType {
    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::ForcedKill | AuditEventType::CleanupFailure => AuditSeverity::Warning,
            _ => AuditSeverity::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub timestamp: DateTime<Utc>,
    pub execution_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub details: String,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, execution_id: &str, details: impl Into<String>) -> Self {
        Self {
            event_type,
            severity: event_type.default_severity(),
            timestamp: Utc::now(),
            execution_id: execution_id.to_string(),
            language: None,
            source_sha256: None,
            phase: None,
            outcome: None,
            duration_ms: None,
            details: details.into(),
        }
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn with_source(mut self, code: &str) -> Self {
        self.source_sha256 = Some(source_fingerprint(code));
        self
    }

    pub fn with_phase(mut self, phase: impl ToString) -> Self {
        self.phase = Some(phase.to_string());
        self
    }

    pub fn with_outcome(mut self, outcome: &str) -> Self {
        self.outcome = Some(outcome.to_string());
        self
    }

    pub fn with_duration(mut self, duration: std::time::Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"event_type":"{:?}","serialization_error":"{}"}}"#,
                self.event_type, e
            )
        })
    }
}

/// Emit an event on the audit target
pub fn record(event: AuditEvent) {
    let line = event.to_json();
    match event.severity {
        AuditSeverity::Info => log::info!(target: AUDIT_TARGET, "{}", line),
        AuditSeverity::Warning => log::warn!(target: AUDIT_TARGET, "{}", line),
    }
}

/// Lowercase hex SHA-256 of the source text
pub fn source_fingerprint(code: &str) -> String {
    let digest = Sha256::digest(code.as_bytes());
    format!("{:x}", digest)
}

/// Shorthands for the events the engine emits
pub mod events {
    use super::*;
    use std::time::Duration;

    pub fn execution_start(execution_id: &str, language: &str, code: &str, interactive: bool) {
        let kind = if interactive {
            AuditEventType::SessionStart
        } else {
            AuditEventType::ExecutionStart
        };
        record(
            AuditEvent::new(kind, execution_id, "execution admitted")
                .with_language(language)
                .with_source(code),
        );
    }

    pub fn phase_finished(execution_id: &str, phase: impl ToString, status: &str, elapsed: Duration) {
        record(
            AuditEvent::new(AuditEventType::PhaseFinished, execution_id, status)
                .with_phase(phase)
                .with_duration(elapsed),
        );
    }

    pub fn forced_kill(execution_id: &str, phase: impl ToString, reason: &str) {
        record(
            AuditEvent::new(AuditEventType::ForcedKill, execution_id, reason).with_phase(phase),
        );
    }

    pub fn cleanup_failure(execution_id: &str, error: &str) {
        record(AuditEvent::new(AuditEventType::CleanupFailure, execution_id, error));
    }

    pub fn execution_end(execution_id: &str, language: &str, outcome: &str, duration: Duration) {
        record(
            AuditEvent::new(AuditEventType::ExecutionEnd, execution_id, "execution finished")
                .with_language(language)
                .with_outcome(outcome)
                .with_duration(duration),
        );
    }
}

/// Core types shared across the engine: errors, phases and execution outcomes
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Execution phase of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Compile,
    Run,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Compile => write!(f, "compile"),
            Phase::Run => write!(f, "run"),
        }
    }
}

/// Classified result of one execution. Exactly one kind holds per outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    CompileError {
        message: String,
    },
    RuntimeError {
        stderr: String,
        exit_code: Option<i32>,
        signal: Option<i32>,
    },
    Timeout {
        phase: Phase,
        limit_ms: u64,
    },
    ToolchainMissing {
        tool: String,
        hint: String,
    },
    Cancelled {
        phase: Phase,
    },
    InternalError {
        message: String,
    },
}

impl OutcomeKind {
    /// Stable snake_case label used in reports and audit events
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::CompileError { .. } => "compile_error",
            OutcomeKind::RuntimeError { .. } => "runtime_error",
            OutcomeKind::Timeout { .. } => "timeout",
            OutcomeKind::ToolchainMissing { .. } => "toolchain_missing",
            OutcomeKind::Cancelled { .. } => "cancelled",
            OutcomeKind::InternalError { .. } => "internal_error",
        }
    }

    /// User-facing message for failure kinds.
    ///
    /// Compiler and runtime diagnostics are returned verbatim. Timeouts use a
    /// fixed text that only names the phase.
    pub fn message(&self) -> Option<String> {
        match self {
            OutcomeKind::Success => None,
            OutcomeKind::CompileError { message } => Some(message.clone()),
            OutcomeKind::RuntimeError { stderr, .. } => Some(stderr.clone()),
            OutcomeKind::Timeout { phase, .. } => {
                Some(format!("Time limit exceeded during the {phase} phase"))
            }
            OutcomeKind::ToolchainMissing { tool, hint } => {
                Some(format!("Toolchain executable `{tool}` was not found on PATH. {hint}"))
            }
            OutcomeKind::Cancelled { phase } => {
                Some(format!("Execution cancelled during the {phase} phase"))
            }
            OutcomeKind::InternalError { message } => Some(message.clone()),
        }
    }
}

/// Captured output plus classification of a finished execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Standard output of the run phase, byte for byte (empty when the
    /// program never ran)
    pub stdout: Vec<u8>,
    /// Standard error of the last phase that ran, byte for byte
    pub stderr: Vec<u8>,
    pub kind: OutcomeKind,
    /// Output beyond the configured stdout limit was not stored
    pub stdout_truncated: bool,
    /// Output beyond the configured stderr limit was not stored
    pub stderr_truncated: bool,
    /// Wall time from workspace acquisition to classification
    pub duration: Duration,
}

impl ExecutionOutcome {
    /// Outcome for faults that happen before any phase ran
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            kind: OutcomeKind::InternalError {
                message: message.into(),
            },
            stdout_truncated: false,
            stderr_truncated: false,
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.kind, OutcomeKind::Success)
    }

    /// Stdout for display; invalid UTF-8 is replaced
    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

/// Errors surfaced synchronously by the engine.
///
/// Expected failure modes of a submitted program are never reported here;
/// they are returned as [`OutcomeKind`] data.
#[derive(Error, Debug)]
pub enum CoderunError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Source code is {size} bytes, limit is {limit} bytes")]
    SourceTooLarge { size: usize, limit: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Session error: {0}")]
    Session(String),
}

pub type Result<T> = std::result::Result<T, CoderunError>;

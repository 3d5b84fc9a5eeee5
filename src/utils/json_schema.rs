/// JSON boundary types for HTTP and CLI callers
///
/// These mirror the request/response shapes of the web front end. Field names
/// are part of the wire contract.
use crate::config::types::{CoderunError, ExecutionOutcome, OutcomeKind, Phase, Result};
use crate::exec::executor::ExecutionRequest;
use crate::judge::profile::LanguageProfile;
use serde::{Deserialize, Serialize};

/// Execution request as decoded from JSON
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    pub language: String,
    /// Batch stdin; older clients send it as `user_inputs`
    #[serde(default, alias = "user_inputs")]
    pub stdin: Option<String>,
}

impl From<ExecuteRequest> for ExecutionRequest {
    fn from(request: ExecuteRequest) -> Self {
        let mut execution = ExecutionRequest::new(request.language, request.code);
        execution.stdin = request.stdin;
        execution
    }
}

/// Execution result as returned to JSON callers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// Program stdout; JSON carries text, so invalid UTF-8 is replaced
    pub output: String,
    /// Classified failure message, absent on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Outcome kind label
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// Missing toolchain executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default)]
    pub stdout_truncated: bool,
    #[serde(default)]
    pub stderr_truncated: bool,
    pub duration_ms: u64,
}

impl ExecuteResponse {
    pub fn from_outcome(outcome: &ExecutionOutcome) -> Self {
        let (phase, tool) = match &outcome.kind {
            OutcomeKind::Timeout { phase, .. } | OutcomeKind::Cancelled { phase } => {
                (Some(*phase), None)
            }
            OutcomeKind::CompileError { .. } => (Some(Phase::Compile), None),
            OutcomeKind::RuntimeError { .. } => (Some(Phase::Run), None),
            OutcomeKind::ToolchainMissing { tool, .. } => (None, Some(tool.clone())),
            OutcomeKind::Success | OutcomeKind::InternalError { .. } => (None, None),
        };

        Self {
            output: outcome.stdout_text().into_owned(),
            error: outcome.kind.message(),
            status: outcome.kind.label().to_string(),
            phase,
            tool,
            stdout_truncated: outcome.stdout_truncated,
            stderr_truncated: outcome.stderr_truncated,
            duration_ms: outcome.duration.as_millis() as u64,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CoderunError::Config(format!("Failed to serialize response: {}", e)))
    }
}

impl From<&ExecutionOutcome> for ExecuteResponse {
    fn from(outcome: &ExecutionOutcome) -> Self {
        Self::from_outcome(outcome)
    }
}

/// AI code generation request. Not used by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default = "default_generate_language")]
    pub language: String,
}

fn default_generate_language() -> String {
    "python".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub content: String,
    pub language: String,
}

/// Registry entry as listed by `coderun languages --json`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LanguageInfo {
    pub name: &'static str,
    pub display_name: &'static str,
    pub aliases: Vec<&'static str>,
    pub compiled: bool,
    pub source_file: String,
    pub toolchain: Vec<&'static str>,
    pub compile_timeout_secs: u64,
    pub run_timeout_secs: u64,
}

impl From<&LanguageProfile> for LanguageInfo {
    fn from(profile: &LanguageProfile) -> Self {
        Self {
            name: profile.name,
            display_name: profile.display_name,
            aliases: profile.aliases.to_vec(),
            compiled: profile.is_compiled(),
            source_file: profile.source_filename(""),
            toolchain: profile.toolchain(),
            compile_timeout_secs: profile.compile_timeout.as_secs(),
            run_timeout_secs: profile.run_timeout.as_secs(),
        }
    }
}

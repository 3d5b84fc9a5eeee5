/// Engine configuration loading from coderun.json
use crate::config::types::{CoderunError, Result};
use crate::utils::output::OutputLimits;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "coderun.json";

/// Per-language timeout overrides keyed by canonical language name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageOverride {
    pub compile_timeout_secs: Option<u64>,
    pub run_timeout_secs: Option<u64>,
}

/// Full coderun.json structure. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Parent directory for per-execution workspaces
    pub workspace_root: PathBuf,
    /// Largest accepted source text, in bytes
    pub max_source_bytes: usize,
    /// Executions (batch or interactive) allowed to run at once
    pub max_concurrent_executions: usize,
    /// Delay between SIGTERM and SIGKILL when a process group is terminated
    pub kill_grace_ms: u64,
    /// How long output readers may keep draining after a process exits
    pub output_drain_ms: u64,
    /// Default run timeout for interactive sessions
    pub interactive_run_timeout_secs: u64,
    /// Leftover workspaces older than this are removed at engine start
    pub stale_workspace_secs: u64,
    /// Host environment variables passed through to child processes
    pub preserve_env: Vec<String>,
    pub output: OutputLimits,
    pub languages: HashMap<String, LanguageOverride>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("coderun"),
            max_source_bytes: 64 * 1024,
            max_concurrent_executions: 8,
            kill_grace_ms: 200,
            output_drain_ms: 1_000,
            interactive_run_timeout_secs: 300,
            stale_workspace_secs: 3_600,
            preserve_env: ["PATH", "LANG", "LC_ALL", "JAVA_HOME", "GOROOT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output: OutputLimits::default(),
            languages: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoderunError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| CoderunError::Config(format!("Failed to parse config JSON: {}", e)))?;

        config.validate()?;
        log::debug!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Load ./coderun.json when present, defaults otherwise
    pub fn load_default() -> Result<Self> {
        let config_path = std::env::current_dir()
            .map_err(|e| CoderunError::Config(format!("Failed to get current directory: {}", e)))?
            .join(DEFAULT_CONFIG_FILE);

        if !config_path.exists() {
            log::debug!("{} not found, using built-in defaults", DEFAULT_CONFIG_FILE);
            return Ok(Self::default());
        }

        Self::load_from_file(config_path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_executions == 0 {
            return Err(CoderunError::Config(
                "max_concurrent_executions must be at least 1".to_string(),
            ));
        }
        if self.max_source_bytes == 0 {
            return Err(CoderunError::Config(
                "max_source_bytes must be at least 1".to_string(),
            ));
        }
        if self.interactive_run_timeout_secs == 0 {
            return Err(CoderunError::Config(
                "interactive_run_timeout_secs must be at least 1".to_string(),
            ));
        }
        for (language, limits) in &self.languages {
            if limits.compile_timeout_secs == Some(0) || limits.run_timeout_secs == Some(0) {
                return Err(CoderunError::Config(format!(
                    "timeouts for '{}' must be at least 1 second",
                    language
                )));
            }
        }
        Ok(())
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn output_drain(&self) -> Duration {
        Duration::from_millis(self.output_drain_ms)
    }

    pub fn interactive_run_timeout(&self) -> Duration {
        Duration::from_secs(self.interactive_run_timeout_secs)
    }

    pub fn stale_workspace_age(&self) -> Duration {
        Duration::from_secs(self.stale_workspace_secs)
    }
}

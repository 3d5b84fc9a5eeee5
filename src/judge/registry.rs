/// Language registry: maps identifiers to profiles
use crate::config::loader::EngineConfig;
use crate::config::types::{CoderunError, Result};
use crate::judge::languages::builtin_profiles;
use crate::judge::profile::LanguageProfile;
use crate::utils::toolchain::find_executable;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Immutable identifier-to-profile table
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    profiles: Vec<LanguageProfile>,
    index: HashMap<String, usize>,
}

/// Whether one toolchain executable of one language is installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainStatus {
    pub language: &'static str,
    pub tool: &'static str,
    pub path: Option<PathBuf>,
}

impl ToolchainStatus {
    pub fn is_available(&self) -> bool {
        self.path.is_some()
    }
}

impl LanguageRegistry {
    /// Registry with every built-in language
    pub fn builtin() -> Self {
        let profiles = builtin_profiles();
        let mut index = HashMap::new();
        for (position, profile) in profiles.iter().enumerate() {
            for identifier in profile.identifiers() {
                index.insert(identifier.to_string(), position);
            }
        }
        Self { profiles, index }
    }

    /// Registry from custom profiles. Identifiers must be unique across profiles.
    pub fn from_profiles(profiles: Vec<LanguageProfile>) -> Result<Self> {
        let mut index = HashMap::new();
        for (position, profile) in profiles.iter().enumerate() {
            for identifier in profile.identifiers() {
                let key = identifier.to_lowercase();
                if let Some(previous) = index.insert(key, position) {
                    return Err(CoderunError::Config(format!(
                        "language identifier '{}' is claimed by both '{}' and '{}'",
                        identifier, profiles[previous].name, profile.name
                    )));
                }
            }
        }
        Ok(Self { profiles, index })
    }

    /// Apply per-language timeout overrides from the engine configuration
    pub fn with_overrides(mut self, config: &EngineConfig) -> Result<Self> {
        for (name, overrides) in &config.languages {
            let position = self.position(name).ok_or_else(|| {
                CoderunError::Config(format!("override for unknown language '{name}'"))
            })?;
            let profile = &mut self.profiles[position];
            if let Some(secs) = overrides.compile_timeout_secs {
                profile.compile_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = overrides.run_timeout_secs {
                profile.run_timeout = Duration::from_secs(secs);
            }
            log::debug!(
                "Language {} timeouts: compile={:?} run={:?}",
                profile.name,
                profile.compile_timeout,
                profile.run_timeout
            );
        }
        Ok(self)
    }

    /// Look up a profile by name or alias, ignoring case and surrounding whitespace
    pub fn resolve(&self, identifier: &str) -> Result<&LanguageProfile> {
        self.position(identifier)
            .map(|position| &self.profiles[position])
            .ok_or_else(|| CoderunError::UnsupportedLanguage(identifier.trim().to_string()))
    }

    pub fn languages(&self) -> &[LanguageProfile] {
        &self.profiles
    }

    /// PATH lookup of every toolchain executable the registry references
    pub fn toolchain_report(&self) -> Vec<ToolchainStatus> {
        self.profiles
            .iter()
            .flat_map(|profile| {
                profile.toolchain().into_iter().map(move |tool| ToolchainStatus {
                    language: profile.name,
                    tool,
                    path: find_executable(tool),
                })
            })
            .collect()
    }

    fn position(&self, identifier: &str) -> Option<usize> {
        self.index
            .get(&identifier.trim().to_lowercase())
            .copied()
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

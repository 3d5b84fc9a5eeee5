//! Language registry.
//!
//! The orchestration path stays language-agnostic. Profiles define the
//! source file name, compile and run commands, default timeouts and the
//! toolchain each language needs.

pub mod languages;
pub mod profile;
pub mod registry;

pub use profile::{CommandTemplate, LanguageProfile, PreparedCommand, SourceNaming};
pub use registry::{LanguageRegistry, ToolchainStatus};

//! coderun: compile and run untrusted source code in many languages
//!
//! Every execution gets a private workspace, runs its compile and run phases
//! as host child processes under wall-clock limits, and comes back as one
//! classified outcome. Interactive sessions stream output while stdin is
//! supplied line by line.
//!
//! # Architecture
//!
//! ## Language Registry ([`judge`])
//! - [`judge::registry`]: Identifier and alias lookup, toolchain report
//! - [`judge::profile`]: Source naming and compile/run command templates
//! - [`judge::languages`]: Built-in language tables
//!
//! ## Execution Control ([`exec`])
//! - [`exec::executor`]: Engine entry points (`run_batch`, `start_interactive`)
//! - [`exec::phase`]: One child process phase with timeout and cancellation
//! - [`exec::feeder`]: Batch and interactive stdin delivery
//! - [`exec::session`]: Interactive session handle and event stream
//!
//! ## Outcome Classification ([`verdict`])
//! - [`verdict::classifier`]: Pure mapping from phase reports to outcomes
//!
//! ## Safety & Cleanup ([`safety`])
//! - [`safety::workspace`]: Run-scoped workspaces, always removed
//! - [`safety::permits`]: Concurrency cap on in-flight executions
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::signal`]: Process-group termination and shutdown signals
//! - [`kernel::process_tree`]: Descendant tracking through `/proc`
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: Structured audit events
//!
//! ## Configuration ([`config`])
//! - [`config::loader`]: `coderun.json` loading and validation
//! - [`config::types`]: Errors, phases and outcome types
//!
//! ## Utilities ([`utils`])
//! - [`utils::output`]: Bounded, streaming output collection
//! - [`utils::toolchain`]: PATH lookup of toolchain executables
//! - [`utils::json_schema`]: JSON request/response types
//!
//! # Example
//!
//! ```no_run
//! use coderun::{EngineConfig, ExecutionEngine, OutcomeKind};
//!
//! let engine = ExecutionEngine::new(EngineConfig::default())?;
//! let outcome = engine.run_batch("python", "print(input()[::-1])", "abc\n")?;
//! assert_eq!(outcome.kind, OutcomeKind::Success);
//! assert_eq!(outcome.stdout_text(), "cba\n");
//! # Ok::<(), coderun::CoderunError>(())
//! ```

// Kernel Primitives
pub mod kernel;

// Execution Control
pub mod exec;

// Language registry
pub mod judge;

// Outcome classification
pub mod verdict;

// Safety & Cleanup
pub mod safety;

// Observability
pub mod observability;

// Configuration
pub mod config;

// Utilities
pub mod utils;

// CLI entrypoint wiring for the coderun binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::loader::EngineConfig;
pub use config::types::*;
pub use exec::{
    CancelToken, ExecutionEngine, ExecutionRequest, InteractiveSession, SessionEvent, SessionInput,
};
pub use judge::{LanguageProfile, LanguageRegistry};
pub use utils::output::{OutputChunk, OutputLimits, Stream};

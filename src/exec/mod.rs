//! Execution control
//!
//! Phases run as process-group leaders fed by an input feeder; the engine
//! wraps them in workspace and admission lifecycles.

pub mod executor;
pub mod feeder;
pub mod phase;
pub mod session;

pub use executor::{ExecutionEngine, ExecutionRequest};
pub use phase::CancelToken;
pub use session::{InteractiveSession, SessionEvent, SessionInput};

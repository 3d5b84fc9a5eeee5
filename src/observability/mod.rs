//! Observability
//!
//! Structured audit events for execution lifecycles.

pub mod audit;

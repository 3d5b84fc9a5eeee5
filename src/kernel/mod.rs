//! Thin wrappers around kernel process-control primitives.
//!
//! All `unsafe` code is concentrated here with explicit SAFETY comments.

pub mod process_tree;
pub mod signal;

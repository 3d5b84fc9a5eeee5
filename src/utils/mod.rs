//! Utilities
//!
//! Output collection, toolchain discovery and JSON boundary types.

pub mod json_schema;
pub mod output;
pub mod toolchain;

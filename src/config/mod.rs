//! Configuration and shared types
//!
//! Engine configuration loading plus the error and outcome types every other
//! module speaks.

pub mod loader;
pub mod types;

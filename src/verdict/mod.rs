//! Outcome classification
//!
//! Derives the outcome kind as a pure function over phase reports.

pub mod classifier;

pub use classifier::VerdictClassifier;

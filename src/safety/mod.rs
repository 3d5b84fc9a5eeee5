//! Safety and cleanup
//!
//! Run-scoped workspaces that are always removed, and the admission cap that
//! bounds how many executions hold workspaces and child processes at once.

pub mod permits;
pub mod workspace;

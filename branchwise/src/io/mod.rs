//! I/O helpers for branchwise commands.

pub mod config;
pub mod git;
pub mod init;
pub mod run_state;

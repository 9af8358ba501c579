//! Deterministic, pure logic shared by the branchwise commands.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures (branch names, lineage edges, snapshots) and return
//! deterministic outputs suitable for tests.

pub mod branch_type;
pub mod lineage;
pub mod message;
pub mod remote;
pub mod snapshot;

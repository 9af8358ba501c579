//! Stacked-branch workflows for git with continue, abort and undo.
//!
//! Every command compiles into a [`vm::Program`] of opcodes that a small
//! interpreter executes. Run state is persisted whenever a run stops: a run
//! that pauses on a conflict can then be continued, skipped or aborted, and a
//! finished run can be undone. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure logic (lineage, branch roles, snapshots, messages).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (git subprocesses, config and run
//!   state files). Isolated behind the [`io::git::Runner`] trait to enable
//!   fakes in tests.
//! - **[`hosting`]**: Connectors for code hosting platforms.
//! - **[`vm`]**: Opcodes, programs and the interpreter.
//!
//! Command modules ([`compress`], [`sync`], [`hack`], [`kill`], [`ship`],
//! [`propose`], [`roles`], [`resume`], [`undo`], [`status`]) build programs
//! and run them through a [`session::Session`].

pub mod compress;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod hack;
pub mod hosting;
pub mod io;
pub mod kill;
pub mod logging;
pub mod propose;
pub mod resume;
pub mod roles;
pub mod session;
pub mod ship;
pub mod status;
pub mod sync;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod undo;
pub mod vm;

//! Stable exit codes for branchwise CLI commands.

/// Command succeeded, or a paused run was aborted cleanly.
pub const OK: i32 = 0;
/// Command refused to start (validation) or failed for another reason.
pub const INVALID: i32 = 1;
/// The run paused on a conflict; `continue`, `skip` or `abort` resolve it.
pub const PAUSED: i32 = 2;
/// The run failed and was rolled back to where it started.
pub const ABORTED: i32 = 3;

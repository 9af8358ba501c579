//! Error taxonomy shared by commands and the interpreter.
//!
//! - [`ValidationError`]: a command refused to start; nothing was mutated.
//! - [`StepError`]: an opcode failed while a program was running. Conflicts
//!   pause the run, everything else triggers the rollback path.

use thiserror::Error;

use crate::core::branch_type::BranchType;
use crate::core::lineage::LineageError;
use crate::hosting::HostingError;
use crate::io::git::GitError;

/// Precondition failures detected before any mutation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("cannot {operation} '{branch}': it is a perennial branch")]
    Perennial { branch: String, operation: String },

    #[error("cannot {operation} {role} branch '{branch}'")]
    RoleNotAllowed {
        branch: String,
        role: BranchType,
        operation: String,
    },

    #[error("branch '{branch}' has no commits")]
    NoCommits { branch: String },

    #[error("branch '{branch}' already has only one commit")]
    AlreadyOneCommit { branch: String },

    #[error("a '{command}' run is pending; resolve the pending operation first (continue, skip or abort)")]
    PendingRun { command: String },

    #[error("nothing to continue")]
    NothingToContinue,

    #[error("nothing to skip: the current branch is the last one in this run")]
    NothingToSkip,

    #[error("nothing to abort")]
    NothingToAbort,

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("cannot undo a dry run")]
    DryRun,

    #[error("you must resolve the conflicts before continuing")]
    UnresolvedConflicts,

    #[error("there is no branch '{0}'")]
    UnknownBranch(String),

    #[error("a branch named '{0}' already exists")]
    BranchExists(String),

    #[error("branch '{0}' has no parent branch")]
    NoParent(String),

    #[error("cannot ship '{branch}': its parent '{parent}' is not a perennial branch; ship '{parent}' first")]
    ShipParentNotPerennial { branch: String, parent: String },

    #[error(transparent)]
    Lineage(#[from] LineageError),
}

/// Failure of a single opcode.
#[derive(Debug, Error)]
pub enum StepError {
    /// Recoverable: the user resolves the conflict and continues.
    #[error("{operation} stopped with conflicts")]
    Conflict { operation: String },

    #[error(transparent)]
    Unsupported(HostingError),

    /// Network or process failure talking to git or a hosting platform.
    #[error(transparent)]
    Transport(anyhow::Error),

    #[error(transparent)]
    Fatal(anyhow::Error),
}

/// A run that did not complete. Reported by the CLI with its own exit code.
#[derive(Debug, Error)]
pub enum RunStopped {
    #[error(
        "{step}: {reason}\n\nresolve the conflicts, then run `branchwise continue` \
         (or `branchwise skip` to move on to the next branch, `branchwise abort` to roll back)"
    )]
    Paused { step: String, reason: String },

    #[error("{error}{}\n\nthe run was rolled back to where it started", format_warnings(.warnings))]
    RolledBack { error: String, warnings: Vec<String> },
}

fn format_warnings(warnings: &[String]) -> String {
    if warnings.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\nsome rollback steps failed:");
    for warning in warnings {
        out.push_str("\n- ");
        out.push_str(warning);
    }
    out
}

impl StepError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StepError::Conflict { .. })
    }
}

impl From<GitError> for StepError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::Conflict { operation } => StepError::Conflict { operation },
            err @ GitError::Spawn { .. } => StepError::Transport(err.into()),
            other => StepError::Fatal(other.into()),
        }
    }
}

impl From<HostingError> for StepError {
    fn from(err: HostingError) -> Self {
        match err {
            err @ HostingError::Unsupported { .. } => StepError::Unsupported(err),
            err @ HostingError::Transport(_) => StepError::Transport(err.into()),
            other => StepError::Fatal(other.into()),
        }
    }
}

impl From<ValidationError> for StepError {
    fn from(err: ValidationError) -> Self {
        StepError::Fatal(err.into())
    }
}

impl From<LineageError> for StepError {
    fn from(err: LineageError) -> Self {
        StepError::Fatal(err.into())
    }
}

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        StepError::Fatal(err)
    }
}

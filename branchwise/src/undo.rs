//! `branchwise undo`: revert the last completed run.
//!
//! The stored undo program (or, for older state files, one synthesized from
//! the begin/end snapshots) runs as a fresh `undo` run, so undo can itself be
//! undone. Open changes are stashed around it like around any other run.

use anyhow::Result;

use crate::error::ValidationError;
use crate::io::run_state::RunState;
use crate::session::Session;
use crate::vm::undo::reversal_program;
use crate::vm::{Opcode, Outcome, Program};

pub fn undo(session: &mut Session) -> Result<Outcome> {
    let state = session.load_run_state()?;
    let (program, end_on) = undo_program(state.as_ref())?;
    if program.iter().any(Opcode::needs_connector) {
        session.connect()?;
    }
    session.execute("undo", program, end_on)
}

/// The program that reverts `state` and the branch it leaves the user on.
pub fn undo_program(
    state: Option<&RunState>,
) -> Result<(Program, Option<String>), ValidationError> {
    let Some(state) = state else {
        return Err(ValidationError::NothingToUndo);
    };
    if state.is_unfinished() {
        return Err(ValidationError::PendingRun {
            command: state.command.clone(),
        });
    }
    if state.dry_run {
        return Err(ValidationError::DryRun);
    }
    if !state.undoable {
        return Err(ValidationError::NothingToUndo);
    }
    let program = if state.undo_program.is_empty() {
        reversal_program(state)
    } else {
        state.undo_program.clone()
    };
    if program.is_empty() {
        return Err(ValidationError::NothingToUndo);
    }
    Ok((program, state.begin_branches.active.clone()))
}
